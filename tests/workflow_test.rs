use aduana_review::auth::SessionRestore;
use aduana_review::config::{ReviewConfig, ReviewOptions};
use aduana_review::desk::SYNC_CONFIRMATION;
use aduana_review::prelude::*;
use aduana_review::session::DIRECT_HELP_MESSAGE;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup(server: &MockServer) -> AduanaReview {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let config = ReviewConfig::new(&server.uri(), "fake-api-key").unwrap();
    let options = ReviewOptions::default()
        .with_request_timeout(Duration::from_secs(5))
        .with_max_retries(1)
        .with_retry_backoff(Duration::from_millis(1));
    AduanaReview::new(config, options).unwrap()
}

fn bundle() -> DocumentBundle {
    DocumentBundle::audit()
        .pedimento(DocumentFile::new("ped.pdf", "application/pdf", b"ped".to_vec()))
        .cove(DocumentFile::new("cove.pdf", "application/pdf", b"cove".to_vec()))
}

fn audit_answer() -> Value {
    json!({
        "result": {
            "pedimentoNumber": "24 47 0001",
            "isConforme": false,
            "validations": [
                { "field": "PARTIDA 3", "partida": "3", "status": "error", "error": "Valor no coincide", "potentialFine": "USD $1,500.00" },
                { "field": "INCOTERM", "status": "correct", "error": "Cumple", "savings": "USD $300.00" }
            ],
            "recommendations": "Rectificar valor de la partida 3",
            "totalRisk": "USD $1,500.00",
            "totalSavings": "USD $300.00"
        }
    })
}

#[tokio::test]
async fn test_correction_reaches_history_and_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runAudit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(audit_answer()))
        .expect(1)
        .mount(&server)
        .await;
    let review = setup(&server);

    let admin = review.users().ensure_seed_admin().await.unwrap();
    let created = review
        .users()
        .add_user(&admin, "Ana López", "ana@spaceaduanas.com")
        .await
        .unwrap();
    let ana = review
        .users()
        .login("ana@spaceaduanas.com", &created.password)
        .await
        .unwrap();
    let cookie = review.users().session_cookie(&ana);
    let restored = review
        .users()
        .restore_session(&format!("space_session_user={}", cookie.email))
        .await
        .unwrap();
    assert_eq!(restored, SessionRestore::Restored(ana.clone()));

    let run = assert_ok!(review.reviewer().run_audit(&ana, &bundle()).await);
    assert!(!run.report.is_conforme);

    let mut session = review.start_session(ana.clone()).await.unwrap();
    session.set_audit(Some(run.snapshot.clone()));
    let request = session.request_support(DIRECT_HELP_MESSAGE).await.unwrap();
    assert_eq!(request.audit_data.as_ref(), Some(&run.snapshot));

    let desk = review.desk();
    desk.claim(&admin, &request.id).await.unwrap();
    desk.toggle_finding(&admin, &request.id, 0).await.unwrap();
    let report = desk.sync_to_history(&admin, &request.id).await.unwrap();
    assert_eq!(report.id, run.report.id);
    assert!(report.is_conforme);
    assert!(report.errors[0].is_manually_corrected);
    assert_eq!(report.total_risk.as_deref(), Some("USD $0.00"));
    assert_eq!(report.total_savings.as_deref(), Some("USD $300.00"));

    session.sync().unwrap();
    let view = session.audit().unwrap();
    assert!(view.is_conforme);
    assert_eq!(view.validations[0].status, FindingStatus::Correct);
    assert_eq!(
        session
            .messages()
            .iter()
            .filter(|m| m.text == SYNC_CONFIRMATION)
            .count(),
        1
    );

    desk.resolve(&admin, &request.id).await.unwrap();
    session.sync().unwrap();
    session.sync().unwrap();
    let closing: Vec<&ChatMessage> = session
        .messages()
        .iter()
        .filter(|m| m.text.contains("ha finalizado la sesión"))
        .collect();
    assert_eq!(closing.len(), 1);
    assert!(closing[0].text.starts_with("✅ Hola Ana,"));

    let month = report.date.format("%Y-%m").to_string();
    let csv = review.history().export_month(&month).await.unwrap();
    assert!(csv.contains("\"24 47 0001\",\"Ana Lopez\""));
    assert!(csv.contains("\"CONFORME\""));

    let summary = review.history().summary().await.unwrap();
    assert_eq!(summary.audited, 1);
    assert_eq!(summary.conformes, 1);
    assert_eq!(summary.users, 2);

    assert_eq!(review.store().subscriber_count(), 1);
    let clear = session.logout();
    assert!(clear.starts_with("space_session_user=;"));
    assert_eq!(review.store().subscriber_count(), 0);
}

#[tokio::test]
async fn test_service_outage_records_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runAudit"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(2)
        .mount(&server)
        .await;
    let review = setup(&server);
    let admin = review.users().ensure_seed_admin().await.unwrap();

    let err = assert_err!(review.reviewer().run_audit(&admin, &bundle()).await);
    assert!(matches!(err, Error::ServiceCommunication(_)));
    assert!(review.history().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prose_answer_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runAudit"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "result": "Lo siento, no pude leer el documento." })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let review = setup(&server);
    let admin = review.users().ensure_seed_admin().await.unwrap();

    let err = review.reviewer().run_audit(&admin, &bundle()).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
    assert!(review.history().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_goes_to_assistant_until_claimed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chatWithExpert"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "result": "El COVE es el comprobante de valor." })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let review = setup(&server);
    let admin = review.users().ensure_seed_admin().await.unwrap();
    let ana = review
        .users()
        .add_user(&admin, "Ana", "ana@spaceaduanas.com")
        .await
        .unwrap();

    let mut session = review.start_session(ana.clone()).await.unwrap();
    let answered = session.send("¿qué es el COVE?").await.unwrap();
    assert_eq!(
        answered,
        Delivery::Answered {
            reply: "El COVE es el comprobante de valor.".to_string()
        }
    );
    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["data"]["message"], "¿qué es el COVE?");
    assert_eq!(sent["data"]["history"][0]["role"], "model");

    let request = session.request_support("").await.unwrap();
    assert_eq!(
        request.message,
        "El usuario requiere asistencia técnica inmediata."
    );
    review.desk().claim(&admin, &request.id).await.unwrap();

    let forwarded = session.send("tengo un error en la partida 3").await.unwrap();
    assert_eq!(
        forwarded,
        Delivery::ToAdmin {
            notification_id: request.id.clone(),
            message: review
                .desk()
                .get(&request.id)
                .await
                .unwrap()
                .unwrap()
                .chat_history[1]
                .clone(),
        }
    );
    // the mock expected exactly one assistant call
    server.verify().await;
}
