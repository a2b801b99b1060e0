mod harness;

use harness::config::ConfigBuilder;
use harness::mock_llm::MockLlm;
use harness::router::orchestrator;
use switchyard_core::InferenceRequest;

#[tokio::test]
async fn reloaded_providers_serve_the_next_request() {
    let old = MockLlm::start_with_response("old backend").await.unwrap();
    let new = MockLlm::start_with_response("new backend").await.unwrap();

    let config = ConfigBuilder::new().with_local("gpu", &old.base_url(), 1).build();
    let orchestrator = orchestrator(&config).unwrap();

    let pinned = orchestrator.catalog().snapshot();
    let replacement = ConfigBuilder::new().with_local("gpu-2", &new.base_url(), 1).build();
    let version = orchestrator.reload(&replacement.providers).unwrap();
    assert_eq!(version, 2);
    assert_eq!(pinned.provider_ids().collect::<Vec<_>>(), vec!["gpu"]);

    let outcome = orchestrator
        .handle(InferenceRequest::from_prompt("Hello"))
        .await
        .unwrap();

    assert_eq!(outcome.response.text, "new backend");
    assert_eq!(old.request_count(), 0);
    assert_eq!(new.completion_count(), 1);
}
