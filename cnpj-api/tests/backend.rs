mod common;

use cnpj_api::{ApiError, CredentialProvider, ListFilter, Status};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn record(id: i64, status: &str, razao: &str) -> serde_json::Value {
    json!({
        "id": id,
        "cnpj": format!("1122233300{id:04}"),
        "razao_social": razao,
        "municipio": "Nova Friburgo",
        "status": status,
        "resultado": null,
        "data_criacao": "2024-03-05T14:07:55"
    })
}

#[tokio::test]
async fn login_stores_token_and_user() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_json(json!({"username": "ana", "password": "s3cr3t"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jwt-1",
            "token_type": "bearer",
            "user_id": 4,
            "username": "ana"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, creds) = common::client_for(&server.uri(), None);
    assert!(client.login("ana", "s3cr3t").await.unwrap());
    assert_eq!(creds.token().as_deref(), Some("jwt-1"));
    let user = client.current_user().unwrap();
    assert_eq!((user.id, user.username.as_str()), (4, "ana"));
}

#[tokio::test]
async fn login_with_bad_password_returns_false() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect username or password"})),
        )
        .mount(&server)
        .await;

    let (client, creds) = common::client_for(&server.uri(), None);
    assert!(!client.login("ana", "errada").await.unwrap());
    assert!(creds.token().is_none());
}

#[tokio::test]
async fn list_sends_filters_and_decodes_wrapped_payload() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cnpj/consultar"))
        .and(header("authorization", "Bearer tok"))
        .and(query_param("status", "erro"))
        .and(query_param("texto_erro", "PDF"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2, "pendentes": 0, "processando": 0, "concluidos": 0, "erros": 2,
            "cnpjs": [record(1, "erro", "Padaria São José"), record(2, "erro", "Mercado Central")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    let filter = ListFilter {
        status: Some(Status::Erro),
        texto_erro: Some("PDF".into()),
        search: Some("sao jose".into()),
        ..ListFilter::default()
    };
    let snapshot = client.list(&filter).await.unwrap();
    assert_eq!(snapshot.stats.erros, 2);
    assert_eq!(snapshot.records.len(), 2);

    let visible = filter.apply(&snapshot.records);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, 1);
}

#[tokio::test]
async fn list_accepts_bare_array() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cnpj/consultar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            record(1, "concluido", "A"),
            record(2, "pendente", "B"),
            record(3, "suspenso", "C")
        ])))
        .mount(&server)
        .await;

    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    let snapshot = client.list(&ListFilter::default()).await.unwrap();
    assert_eq!(snapshot.stats.total, 3);
    assert_eq!(snapshot.stats.concluidos, 1);
    assert_eq!(snapshot.stats.pendentes, 1);
    assert_eq!(snapshot.records[2].status, Status::Unknown("suspenso".into()));
}

#[tokio::test]
async fn unauthorized_clears_credentials() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cnpj/consultar"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, creds) = common::client_for(&server.uri(), Some("old"));
    let err = client.list(&ListFilter::default()).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(creds.token().is_none());
    assert!(!client.is_logged_in());
}

#[tokio::test]
async fn reprocess_all_passes_limit_and_error_text() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cnpj/reprocessar-erros-recriando"))
        .and(query_param("texto_erro", "timeout"))
        .and(query_param("limite", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_processed": 12, "cnpjs": []})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    let result = client.reprocess_all(Some("timeout"), None, 50).await.unwrap();
    assert_eq!(result.total_processed, 12);
}

#[tokio::test]
async fn reprocess_one_keeps_the_row() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cnpj/reprocessar-cnpj-individual"))
        .and(query_param("cnpj_id", "42"))
        .and(query_param("deletar_registro", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_processed": 1, "cnpjs": []})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    assert_eq!(client.reprocess_one(42).await.unwrap().total_processed, 1);
}

#[tokio::test]
async fn delete_picks_single_or_batch_endpoint() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/cnpj/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cnpj/delete-batch"))
        .and(body_json(json!({"ids": [1, 2, 3]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    assert!(client.delete(&[7]).await.unwrap().is_null());
    assert_eq!(client.delete(&[1, 2, 3]).await.unwrap()["deleted"], 3);
}

#[tokio::test]
async fn upload_posts_multipart_file() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cnpj/process"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_processed": 3, "cnpjs": []})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lista.xlsx");
    std::fs::write(&file, b"PK\x03\x04fake").unwrap();

    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    assert_eq!(client.upload_path(&file).await.unwrap().total_processed, 3);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"lista.xlsx\""));
}

#[tokio::test]
async fn upload_rejects_wrong_type_before_sending() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    let err = client.upload("lista.csv", b"a;b").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn backend_detail_reaches_the_user() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cnpj/reprocessar-erros-recriando"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "Erro ao conectar ao banco"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = common::client_for(&server.uri(), Some("tok"));
    let err = client.reprocess_all(None, None, 100).await.unwrap_err();
    assert_eq!(err.detail(), "Erro ao conectar ao banco");
}
