//! Serving the rule export endpoint over a real listener.

use bastion_core::ServiceRuleSet;
use bastion_scanner::{
    PublishedRules, RouteTable, RuleExportEndpoint, RuleScanner, SecurityDeclaration,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn start(published: PublishedRules) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel::<()>();
    let endpoint = RuleExportEndpoint::new("/security/rules", published);
    let handle = tokio::spawn(async move {
        endpoint
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    (base, tx, handle)
}

/// The gateway sees exactly what the scanner published.
#[tokio::test]
async fn serves_published_rules() {
    let published = PublishedRules::new();
    RuleScanner::new("orders", "")
        .excluding_export_path("/security/rules")
        .scan_and_publish(
            RouteTable::new("")
                .get("/orders/{id}", SecurityDeclaration::secured(["ADMIN"]))
                .post("/orders", SecurityDeclaration::Public)
                .get("/security/rules", SecurityDeclaration::Public)
                .into_routes(),
            &published,
        )
        .unwrap();

    let (base, stop, handle) = start(published.clone()).await;

    let response = reqwest::get(format!("{base}/security/rules")).await.unwrap();
    assert_eq!(response.status(), 200);
    let rules = ServiceRuleSet::from_json(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(&rules, published.get().unwrap());
    assert_eq!(rules.total_rules(), 2);

    let missing = reqwest::get(format!("{base}/nope")).await.unwrap();
    assert_eq!(missing.status(), 404);

    stop.send(()).unwrap();
    handle.await.unwrap();
}

/// Before the scan completes the endpoint reports itself unavailable.
#[tokio::test]
async fn unavailable_until_published() {
    let published = PublishedRules::new();
    let (base, stop, handle) = start(published.clone()).await;

    let response = reqwest::get(format!("{base}/security/rules")).await.unwrap();
    assert_eq!(response.status(), 503);

    RuleScanner::new("orders", "")
        .scan_and_publish(
            RouteTable::new("")
                .post("/orders", SecurityDeclaration::Public)
                .into_routes(),
            &published,
        )
        .unwrap();

    let response = reqwest::get(format!("{base}/security/rules")).await.unwrap();
    assert_eq!(response.status(), 200);

    stop.send(()).unwrap();
    handle.await.unwrap();
}
