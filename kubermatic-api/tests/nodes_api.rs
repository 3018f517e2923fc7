//! Node and node deployment endpoints

mod common;

use axum::http::{Method, StatusCode};
use common::*;
use kubermatic_api::nodes::CLUSTER_NOT_READY;
use kubermatic_common::api::{Node, NodeDeployment, NodeDeploymentSpec};
use kubermatic_common::Group;
use serde_json::json;

const CLUSTER: &str = "/api/v1/projects/myProjectInternalName/dc/us-central1/clusters/abcd";

async fn cluster_env(healthy: bool) -> TestEnv {
    let env = TestEnv::new();
    env.bind("myProjectInternalName", "john@acme.com", Group::Owners).await;
    env.bind("myProjectInternalName", "alice@acme.com", Group::Viewers).await;
    env.add_cluster("abcd", "myProjectInternalName", healthy).await;
    env
}

fn seeded_node(id: &str) -> Node {
    let mut node = Node {
        id: id.to_string(),
        name: id.to_string(),
        ..Default::default()
    };
    node.status.machine_name = id.to_string();
    node
}

#[tokio::test]
async fn test_delete_node() {
    let env = cluster_env(true).await;
    env.provider.insert_node("abcd", seeded_node("venus")).await;

    let uri = format!("{}/nodes/venus", CLUSTER);
    let (status, body) = env.get(&uri, JOHN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "venus");

    let (status, body) = env.send(Method::DELETE, &uri, Some(JOHN), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body, json!({}));

    let (status, body) = env.get(&uri, JOHN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn test_delete_missing_node() {
    let env = cluster_env(true).await;
    let (status, _) = env
        .send(Method::DELETE, &format!("{}/nodes/mars", CLUSTER), Some(JOHN), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_node_on_unhealthy_cluster() {
    let env = cluster_env(false).await;
    env.provider.insert_node("abcd", seeded_node("venus")).await;

    let (status, _) = env
        .send(Method::DELETE, &format!("{}/nodes/venus", CLUSTER), Some(JOHN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_node() {
    let env = cluster_env(true).await;
    let request = r#"{"spec":{"cloud":{"digitalocean":{"size":"s-1vcpu-1gb"}},"operatingSystem":{"ubuntu":{"distUpgradeOnBoot":true}},"versions":{"kubelet":"1.9.0"}}}"#;

    let (status, body) = env
        .send(Method::POST, &format!("{}/nodes", CLUSTER), Some(JOHN), Some(request))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let id = body["id"].as_str().unwrap();
    assert!(id.starts_with("kubermatic-abcd-"));
    assert_eq!(body["name"], id);
    assert_eq!(body["status"]["machineName"], id);
    assert_eq!(body["spec"]["cloud"]["digitalocean"]["size"], "s-1vcpu-1gb");
    assert_eq!(body["spec"]["versions"]["kubelet"], "1.9.0");

    let (status, body) = env.get(&format!("{}/nodes", CLUSTER), ("alice@acme.com", "alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_node_on_unhealthy_cluster() {
    let env = cluster_env(false).await;
    let (status, body) = env
        .send(Method::POST, &format!("{}/nodes", CLUSTER), Some(JOHN), Some("{}"))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, error_body(503, CLUSTER_NOT_READY));
    assert!(env.provider.actions().await.is_empty());
}

#[tokio::test]
async fn test_viewer_cannot_create_node() {
    let env = cluster_env(true).await;
    let (status, body) = env
        .send(
            Method::POST,
            &format!("{}/nodes", CLUSTER),
            Some(("alice@acme.com", "alice")),
            Some("{}"),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        error_body(
            403,
            "forbidden: The user \"alice@acme.com\" is not allowed to create nodes in the project = myProjectInternalName, editors group is required"
        )
    );
}

#[tokio::test]
async fn test_create_node_deployment() {
    let env = cluster_env(true).await;
    let request = r#"{"name":"venus","spec":{"replicas":1,"template":{"cloud":{"digitalocean":{"size":"s-1vcpu-1gb"}},"versions":{"kubelet":"1.9.9"}}}}"#;

    let (status, body) = env
        .send(
            Method::POST,
            &format!("{}/nodedeployments", CLUSTER),
            Some(JOHN),
            Some(request),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["id"], "venus");
    assert_eq!(body["spec"]["replicas"], 1);
    assert_eq!(body["spec"]["template"]["versions"]["kubelet"], "1.9.9");
    assert_eq!(body["spec"]["paused"], false);
}

#[tokio::test]
async fn test_duplicate_names_conflict() {
    let env = cluster_env(true).await;

    let deployment = r#"{"name":"venus","spec":{"replicas":1,"template":{}}}"#;
    let uri = format!("{}/nodedeployments", CLUSTER);
    let (status, _) = env.send(Method::POST, &uri, Some(JOHN), Some(deployment)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = env.send(Method::POST, &uri, Some(JOHN), Some(deployment)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body,
        error_body(409, "machinedeployments.cluster.k8s.io \"venus\" already exists")
    );

    let uri = format!("{}/nodes", CLUSTER);
    let (status, _) = env.send(Method::POST, &uri, Some(JOHN), Some(r#"{"name":"mars"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = env.send(Method::POST, &uri, Some(JOHN), Some(r#"{"name":"mars"}"#)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], 409);

    let (_, body) = env.get(&uri, JOHN).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_node_deployment_on_unhealthy_cluster() {
    let env = cluster_env(false).await;
    let request = r#"{"name":"venus","spec":{"replicas":1,"template":{}}}"#;

    let (status, body) = env
        .send(
            Method::POST,
            &format!("{}/nodedeployments", CLUSTER),
            Some(JOHN),
            Some(request),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, error_body(503, CLUSTER_NOT_READY));
}

#[tokio::test]
async fn test_patch_node_deployment() {
    let env = cluster_env(true).await;
    env.provider
        .insert_node_deployment(
            "abcd",
            NodeDeployment {
                id: "venus".to_string(),
                name: "venus".to_string(),
                spec: NodeDeploymentSpec {
                    replicas: 1,
                    template: Default::default(),
                    paused: false,
                },
                ..Default::default()
            },
        )
        .await;

    let uri = format!("{}/nodedeployments/venus", CLUSTER);
    let (status, body) = env
        .send(
            Method::PATCH,
            &uri,
            Some(JOHN),
            Some(r#"{"id":"renamed","spec":{"replicas":3,"paused":true}}"#),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["id"], "venus");
    assert_eq!(body["spec"]["replicas"], 3);
    assert_eq!(body["spec"]["paused"], true);

    let (status, body) = env
        .send(Method::PATCH, &uri, Some(JOHN), Some(r#"{"spec":{"replicas":-1}}"#))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, error_body(400, "replicas must not be negative"));

    let (_, body) = env.get(&uri, JOHN).await;
    assert_eq!(body["spec"]["replicas"], 3);

    let (status, _) = env.send(Method::DELETE, &uri, Some(JOHN), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = env.get(&uri, JOHN).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cluster_scoping() {
    let env = cluster_env(true).await;
    env.add_project("other").await;
    env.bind("other-ID", "john@acme.com", Group::Owners).await;

    // wrong datacenter
    let (status, _) = env
        .get(
            "/api/v1/projects/myProjectInternalName/dc/europe-west3/clusters/abcd/nodes",
            JOHN,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // cluster belongs to another project
    let (status, _) = env
        .get("/api/v1/projects/other-ID/dc/us-central1/clusters/abcd/nodes", JOHN)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = env.get(&format!("{}/nodes", CLUSTER), BOB).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
