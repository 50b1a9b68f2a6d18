//! Service flows over the in-memory backend

use std::sync::Arc;

use simple_bank::db::{ErrorKind, MemoryBackend, Store};
use simple_bank::service::{
    CreateAccountRequest, CreateUserRequest, LoginUserRequest, TransferRequest, ValidationError,
    VerifyEmailRequest,
};
use simple_bank::util::random_string;
use simple_bank::worker::TASK_SEND_VERIFY_EMAIL;
use simple_bank::{AppConfig, BankService, OutboxDistributor, ServiceError};

const CONFIG: &str = r#"
log_level: "debug"
log_dir: "./logs"
log_file: "bank.log"
use_json: false
rotation: "never"
postgres_url: "postgresql://localhost/bank"
token_symmetric_key: "12345678901234567890123456789012"
access_token_duration_secs: 60
"#;

const PASSWORD: &str = "secret123";

type Service = BankService<MemoryBackend>;

fn new_service() -> Service {
    let config = AppConfig::from_yaml(CONFIG).unwrap();
    let store = Arc::new(Store::new(MemoryBackend::new()));
    BankService::new(config, store, Arc::new(OutboxDistributor)).unwrap()
}

fn user_request() -> CreateUserRequest {
    let username = random_string(10).to_lowercase();
    CreateUserRequest {
        email: format!("{}@example.com", username),
        username,
        password: PASSWORD.to_string(),
        full_name: "Jane Doe".to_string(),
    }
}

/// Register and log in; returns (username, access token)
async fn signed_in(service: &Service) -> (String, String) {
    let req = user_request();
    let username = req.username.clone();
    service.create_user(req).await.unwrap();
    let login = service
        .login_user(LoginUserRequest {
            username: username.clone(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap();
    (username, login.access_token)
}

async fn funded_account(service: &Service, token: &str, currency: &str, balance: i64) -> i64 {
    let account = service
        .create_account(
            token,
            CreateAccountRequest {
                currency: currency.to_string(),
            },
        )
        .await
        .unwrap();
    let id = account.id;
    service
        .store()
        .exec_tx(move |q| q.add_account_balance(id, balance))
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_create_user_hashes_password_and_enqueues_task() {
    let service = new_service();
    let req = user_request();
    let username = req.username.clone();

    let view = service.create_user(req).await.unwrap();
    assert_eq!(view.username, username);
    assert!(!view.is_email_verified);

    let stored = service.store().get_user(&username).await.unwrap();
    assert_ne!(stored.hashed_password, PASSWORD);

    let tasks = service.store().backend().tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, TASK_SEND_VERIFY_EMAIL);
    assert_eq!(tasks[0].queue, "critical");
}

#[tokio::test]
async fn test_create_user_reports_every_violation() {
    let service = new_service();
    let err = service
        .create_user(CreateUserRequest {
            username: "Bad Name".to_string(),
            password: "123".to_string(),
            full_name: "J".to_string(),
            email: "not-an-email".to_string(),
        })
        .await
        .unwrap_err();

    match err {
        ServiceError::InvalidArgument(violations) => assert_eq!(violations.len(), 4),
        other => panic!("expected invalid argument, got {other}"),
    }
    assert!(service.store().backend().tasks().is_empty());
}

#[tokio::test]
async fn test_create_user_duplicate_maps_to_conflict() {
    let service = new_service();
    let req = user_request();
    service.create_user(req.clone()).await.unwrap();

    let err = service.create_user(req).await.unwrap_err();
    assert!(matches!(&err, ServiceError::Store(e) if e.kind() == ErrorKind::Conflict));
    assert_eq!(err.http_status(), 409);
}

#[tokio::test]
async fn test_login() {
    let service = new_service();
    let (username, token) = signed_in(&service).await;

    let payload = service.token_maker().verify_token(&token).unwrap();
    assert_eq!(payload.username, username);

    let wrong_password = service
        .login_user(LoginUserRequest {
            username: username.clone(),
            password: "wrong-password".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(wrong_password, ServiceError::Unauthenticated(_)));

    let unknown = service
        .login_user(LoginUserRequest {
            username: "nobody_here".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(unknown, ServiceError::Unauthenticated(_)));
    assert_eq!(unknown.to_string(), wrong_password.to_string());
}

#[tokio::test]
async fn test_create_account() {
    let service = new_service();
    let (username, token) = signed_in(&service).await;

    let account = service
        .create_account(
            &token,
            CreateAccountRequest {
                currency: "EUR".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(account.owner, username);
    assert_eq!(account.balance, 0);
    assert_eq!(account.currency, "EUR");

    let bad_token = service
        .create_account(
            "garbage",
            CreateAccountRequest {
                currency: "EUR".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(bad_token.http_status(), 401);

    let bad_currency = service
        .create_account(
            &token,
            CreateAccountRequest {
                currency: "JPY".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        bad_currency,
        ServiceError::InvalidArgument(ref v) if matches!(v[0], ValidationError::InvalidFormat { field: "currency", .. })
    ));

    let duplicate = service
        .create_account(
            &token,
            CreateAccountRequest {
                currency: "EUR".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(&duplicate, ServiceError::Store(e) if e.kind() == ErrorKind::Conflict));
}

#[tokio::test]
async fn test_create_transfer() {
    let service = new_service();
    let (_, alice) = signed_in(&service).await;
    let (_, bob) = signed_in(&service).await;

    let alice_usd = funded_account(&service, &alice, "USD", 100).await;
    let bob_usd = funded_account(&service, &bob, "USD", 50).await;
    let bob_eur = funded_account(&service, &bob, "EUR", 50).await;

    let result = service
        .create_transfer(
            &alice,
            TransferRequest {
                from_account_id: alice_usd,
                to_account_id: bob_usd,
                amount: 30,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.from_account.balance, 70);
    assert_eq!(result.to_account.balance, 80);

    // Not the owner of the source account
    let denied = service
        .create_transfer(
            &alice,
            TransferRequest {
                from_account_id: bob_usd,
                to_account_id: alice_usd,
                amount: 10,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(denied, ServiceError::PermissionDenied(_)));

    let mismatch = service
        .create_transfer(
            &alice,
            TransferRequest {
                from_account_id: alice_usd,
                to_account_id: bob_eur,
                amount: 10,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        mismatch,
        ServiceError::CurrencyMismatch { account_id, .. } if account_id == bob_eur
    ));

    let overdraft = service
        .create_transfer(
            &alice,
            TransferRequest {
                from_account_id: alice_usd,
                to_account_id: bob_usd,
                amount: 1_000,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(overdraft.code(), "INSUFFICIENT_BALANCE");

    let invalid = service
        .create_transfer(
            &alice,
            TransferRequest {
                from_account_id: alice_usd,
                to_account_id: bob_usd,
                amount: 0,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(invalid.http_status(), 400);

    let self_transfer = service
        .create_transfer(
            &alice,
            TransferRequest {
                from_account_id: alice_usd,
                to_account_id: alice_usd,
                amount: 10,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(self_transfer.code(), "SELF_TRANSFER");

    assert_eq!(service.store().get_account(alice_usd).await.unwrap().balance, 70);
}

#[tokio::test]
async fn test_issue_and_verify_email() {
    let service = new_service();
    let (username, _) = signed_in(&service).await;

    let record = service.issue_verify_email(&username).await.unwrap();
    assert_eq!(record.username, username);
    assert!(record.expired_at > record.created_at);

    let response = service
        .verify_email(VerifyEmailRequest {
            email_id: record.id,
            secret_code: record.secret_code.clone(),
        })
        .await
        .unwrap();
    assert!(response.is_verified);

    let replay = service
        .verify_email(VerifyEmailRequest {
            email_id: record.id,
            secret_code: record.secret_code,
        })
        .await
        .unwrap_err();
    assert_eq!(replay.code(), "INVALID_OR_EXPIRED_CODE");

    let short_code = service
        .verify_email(VerifyEmailRequest {
            email_id: record.id,
            secret_code: "short".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(short_code, ServiceError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_issue_verify_email_unknown_user() {
    let service = new_service();
    let err = service.issue_verify_email("ghost_user").await.unwrap_err();
    assert_eq!(err.http_status(), 404);
}
