// tests/routing.rs

use agentflow::errors::SchedulerError;
use agentflow::routing::AgentRouter;
use agentflow::types::{Address, Capability};
use agentflow_test_utils::builders::ConfigFileBuilder;
use agentflow_test_utils::router_with;

fn caps(tags: &[&str]) -> Vec<Capability> {
    tags.iter().map(|t| Capability::new(*t)).collect()
}

#[test]
fn first_routable_capability_wins() {
    let router = router_with(&[
        ("nlp_to_sql", "QueryAgentQueue"),
        ("database_operations", "SQLAgentQueue"),
    ]);

    let address = router
        .route(&caps(&["speech", "database_operations", "nlp_to_sql"]))
        .unwrap();
    assert_eq!(address, Address::new("SQLAgentQueue"));
}

#[test]
fn no_route_is_no_capable_agent() {
    let router = router_with(&[("nlp_to_sql", "QueryAgentQueue")]);

    let err = router.route(&caps(&["speech"])).unwrap_err();
    match err {
        SchedulerError::NoCapableAgent(tags) => assert_eq!(tags, caps(&["speech"])),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(router.route(&[]).is_err());
}

#[test]
fn register_replaces_and_unregister_removes() {
    let router = AgentRouter::new();
    assert!(router.is_empty());

    assert_eq!(
        router.register(Capability::new("nlp_to_sql"), Address::new("Old")),
        None
    );
    assert_eq!(
        router.register(Capability::new("nlp_to_sql"), Address::new("New")),
        Some(Address::new("Old"))
    );
    assert_eq!(
        router.route(&caps(&["nlp_to_sql"])).unwrap(),
        Address::new("New")
    );

    assert_eq!(
        router.unregister(&Capability::new("nlp_to_sql")),
        Some(Address::new("New"))
    );
    assert!(router.route(&caps(&["nlp_to_sql"])).is_err());
    assert_eq!(router.unregister(&Capability::new("nlp_to_sql")), None);
}

#[test]
fn from_config_loads_every_route() {
    let cfg = ConfigFileBuilder::new()
        .with_route("nlp_to_sql", "QueryAgentQueue")
        .with_route("template_management", "TemplateAgentQueue")
        .build();

    let router = AgentRouter::from_config(&cfg);
    assert_eq!(router.len(), 2);

    let snapshot: Vec<(String, String)> = router
        .routes()
        .into_iter()
        .map(|(c, a)| (c.to_string(), a.to_string()))
        .collect();
    assert_eq!(
        snapshot,
        vec![
            ("nlp_to_sql".to_string(), "QueryAgentQueue".to_string()),
            (
                "template_management".to_string(),
                "TemplateAgentQueue".to_string()
            ),
        ]
    );
}
