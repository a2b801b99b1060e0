//! Heuristic request classification
//!
//! Derives a `ComplexityProfile` from token counting and pattern matching.
//! Pure and deterministic: the same request and config always produce the
//! same profile, and classification never fails.

use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;
use switchyard_config::ClassifierConfig;
use switchyard_core::{ComplexityProfile, ComplexitySignal, Confidence, InferenceRequest, TaskClass};
use tiktoken_rs::{CoreBPE, o200k_base};

/// Encoder shared by every classification, `None` if it failed to load
static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| o200k_base().ok());

// -- Regex patterns compiled once via LazyLock --

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```\w*\n").unwrap());

static FILE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\w./\\-]+\.(rs|ts|tsx|js|jsx|py|go|java|cpp|c|h|rb|php|swift|kt)\b").unwrap());

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:use |import |from |require\(|#include )").unwrap());

static FUNC_SIG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:fn |def |func |function |pub fn |async fn )\w+\s*[\(<]").unwrap());

static LATEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(?:frac|sum|int|prod|lim|sqrt|begin\{equation\})").unwrap());

static MATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:integral|derivative|theorem|eigenvalue|prove that|solve for|differential equation)\b").unwrap()
});

static ANALYSIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:correlat\w*|regression|dataset|dataframe|pivot table|outliers?|histogram|statistical significance)\b")
        .unwrap()
});

static LEGAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:contract clause|indemnif\w*|liabilit(?:y|ies)|statute|jurisdiction|plaintiff|defendant|tort)\b")
        .unwrap()
});

static MEDICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:diagnos\w*|symptoms?|dosage|prescription|clinical|contraindicat\w*|patient history)\b").unwrap()
});

/// Estimate token count using tiktoken, `len / 4` if the encoder is unavailable
pub fn estimate_tokens(text: &str) -> usize {
    ENCODER
        .as_ref()
        .map_or_else(|| text.len() / 4, |bpe| bpe.encode_with_special_tokens(text).len())
}

/// Classify a request
pub fn classify(request: &InferenceRequest, config: &ClassifierConfig) -> ComplexityProfile {
    let privacy_sensitive = request.constraints.privacy_sensitive;
    let max_output_tokens = request.constraints.max_output_tokens;
    let affinity_key = affinity_key(request);

    if !request.has_content() {
        return ComplexityProfile {
            estimated_tokens: 0,
            privacy_sensitive,
            task_class: TaskClass::Simple,
            confidence: Confidence::Low,
            signals: Vec::new(),
            domain_tags: normalize_tags(request.domain_tags.iter().map(String::as_str)),
            required_context_tokens: required_context(request, 0),
            max_output_tokens,
            affinity_key,
        };
    }

    let full_text = request.full_text();
    let estimated_tokens = estimate_tokens(&full_text);
    let detected = detect_domains(request.last_user_text());
    let domain_tags = normalize_tags(request.domain_tags.iter().map(String::as_str).chain(detected));

    let mut signals = Vec::new();
    if estimated_tokens > config.complex_token_threshold {
        signals.push(ComplexitySignal::LongInput {
            tokens: estimated_tokens,
        });
    }
    if privacy_sensitive {
        signals.push(ComplexitySignal::PrivacyFlag);
    }
    for tag in &domain_tags {
        if config.complex_domains.iter().any(|d| d.eq_ignore_ascii_case(tag)) {
            signals.push(ComplexitySignal::ComplexDomain { tag: tag.clone() });
        }
    }

    let task_class = if signals.is_empty() {
        TaskClass::Simple
    } else {
        TaskClass::Complex
    };

    tracing::debug!(
        request_id = %request.id,
        tokens = estimated_tokens,
        ?task_class,
        signals = signals.len(),
        "request classified"
    );

    ComplexityProfile {
        estimated_tokens,
        privacy_sensitive,
        task_class,
        confidence: Confidence::Normal,
        signals,
        domain_tags,
        required_context_tokens: required_context(request, estimated_tokens),
        max_output_tokens,
        affinity_key,
    }
}

/// Key used to keep related requests on one provider
///
/// The session id when present, otherwise a hash of the system prompt.
pub fn affinity_key(request: &InferenceRequest) -> Option<String> {
    if let Some(session) = request.session_id.as_deref()
        && !session.trim().is_empty()
    {
        return Some(format!("session:{session}"));
    }

    request.system_prompt().filter(|s| !s.trim().is_empty()).map(|prompt| {
        let mut hasher = DefaultHasher::new();
        prompt.hash(&mut hasher);
        format!("system:{:016x}", hasher.finish())
    })
}

fn required_context(request: &InferenceRequest, estimated_tokens: usize) -> u32 {
    if let Some(explicit) = request.constraints.context_tokens {
        return explicit;
    }
    let input = u32::try_from(estimated_tokens).unwrap_or(u32::MAX);
    input.saturating_add(request.constraints.max_output_tokens.unwrap_or(0))
}

fn normalize_tags<'a>(tags: impl Iterator<Item = &'a str>) -> Vec<String> {
    tags.map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Domain tags inferred from message content
fn detect_domains(text: &str) -> Vec<&'static str> {
    let mut detected = Vec::new();
    if is_code(text) {
        detected.push("code");
    }
    if LATEX_RE.is_match(text) || MATH_RE.is_match(text) {
        detected.push("math");
    }
    if ANALYSIS_RE.is_match(text) {
        detected.push("analysis");
    }
    if LEGAL_RE.is_match(text) {
        detected.push("legal");
    }
    if MEDICAL_RE.is_match(text) {
        detected.push("medical");
    }
    detected
}

fn is_code(text: &str) -> bool {
    CODE_FENCE_RE.is_match(text)
        || text.contains("```")
        || FILE_PATH_RE.is_match(text)
        || IMPORT_RE.is_match(text)
        || FUNC_SIG_RE.is_match(text)
}
