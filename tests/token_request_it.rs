#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_sts_client::{
	_preludet::*,
	cache::{CacheKey, MemoryTokenCache, TokenCache},
	error::ClientErrorKind,
	obs::{MemoryTelemetry, TelemetryEvent},
	protocol::{
		AuthenticationScheme, AuthorizationRequest, AuthorizationResponse, GrantType, TokenSecret,
	},
	strategy::{OAuth2Strategy, TokenGrant},
};

const CLIENT_ID: &str = "client-sts";
const REDIRECT_URI: &str = "msauth://com.contoso.app/callback";
const TOKEN_PATH: &str = "/common/oAuth2/v2.0/token";
const ID_TOKEN: &str = "eyJhbGciOiJub25lIn0.eyJvaWQiOiJvaWQtMSIsInRpZCI6InRpZC0xIiwicHJlZmVycmVkX3VzZXJuYW1lIjoidXNlckBjb250b3NvLmNvbSIsIm5hbWUiOiJUZXN0IFVzZXIifQ.sig";
const CLIENT_INFO: &str = "eyJ1aWQiOiJ1aWQtMSIsInV0aWQiOiJ1dGlkLTEifQ";

fn token_body(token_type: &str) -> String {
	format!(
		"{{\"access_token\":\"access-1\",\"refresh_token\":\"refresh-1\",\"id_token\":\"{ID_TOKEN}\",\"client_info\":\"{CLIENT_INFO}\",\"token_type\":\"{token_type}\",\"expires_in\":3600,\"scope\":\"user.read\"}}"
	)
}

fn authorization_request() -> AuthorizationRequest {
	AuthorizationRequest::builder(CLIENT_ID, REDIRECT_URI)
		.state("S1")
		.scope("user.read openid profile offline_access")
		.correlation_id("corr-1")
		.build()
}

fn authorization_response(extra: &[(&str, &str)]) -> AuthorizationResponse {
	let mut parameters =
		BTreeMap::from([("code".to_owned(), "ABC123".to_owned()), ("state".to_owned(), "S1".to_owned())]);

	parameters.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

	AuthorizationResponse::from_parameters(parameters)
}

#[tokio::test]
async fn code_redemption_sends_headers_and_records_skew() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("client-request-id", "corr-1")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("grant_type=authorization_code")
				.body_includes("code=ABC123")
				.body_includes("client_info=1")
				.body_includes("code_verifier=");
			then.status(200)
				.header("content-type", "application/json")
				.header("date", "Mon, 01 Jan 2024 00:00:00 GMT")
				.body(token_body("Bearer"));
		})
		.await;
	let telemetry = Arc::new(MemoryTelemetry::default());
	let params = test_strategy_parameters().telemetry(telemetry.clone());
	let clock = params.clock.clone();
	let strategy = OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), params)
		.await
		.expect("Strategy should build against the mock authority.");
	let request = authorization_request();
	let token_request = strategy
		.create_token_request(&request, &authorization_response(&[]))
		.expect("Token request should build from the redirect.");

	assert_eq!(token_request.grant_type, GrantType::AuthorizationCode);
	assert!(!token_request.pkey_auth_header_allowed);

	let result =
		strategy.request_token(&token_request).await.expect("Token request should succeed.");

	mock.assert_async().await;

	let response = result.success_response().expect("Result should carry a token response.");

	assert_eq!(response.access_token.as_ref().map(TokenSecret::expose), Some("access-1"));
	assert_eq!(response.authority.as_ref(), Some(&strategy.token_endpoint()));
	assert!(response.response_received_time.is_some());
	assert!(clock.skew() > Duration::days(30));

	let events = telemetry.events();

	assert!(matches!(
		&events[0],
		TelemetryEvent::TokenRequestSent { correlation_id, grant_type }
			if correlation_id == "corr-1" && grant_type == "authorization_code"
	));
	assert!(matches!(
		&events[1],
		TelemetryEvent::TokenResponseReceived { status: 200, .. }
	));

	let account = strategy
		.create_account(&result)
		.expect("Account should decode.")
		.expect("Successful result should yield an account.");

	assert_eq!(account.home_account_id, "uid-1.utid-1");
	assert_eq!(account.username.as_deref(), Some("user@contoso.com"));
	assert_eq!(account.environment, "127.0.0.1");
}

#[tokio::test]
async fn pop_request_rejects_bearer_answer() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body_includes("token_type=pop").body_includes("req_cnf=");
			then.status(200).header("content-type", "application/json").body(token_body("Bearer"));
		})
		.await;
	let pop_manager = Arc::new(FakePopManager::default());
	let params = test_strategy_parameters().pop_manager(pop_manager.clone());
	let strategy = OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), params)
		.await
		.expect("Strategy should build against the mock authority.");
	let token_request = strategy
		.create_grant_request(
			CLIENT_ID,
			TokenGrant::RefreshToken(TokenSecret::new("refresh-0")),
			Some("user.read".into()),
			&AuthenticationScheme::Pop,
		)
		.expect("Pop refresh request should build.");
	let err = strategy
		.request_token(&token_request)
		.await
		.expect_err("A bearer token must not satisfy a pop request.");

	mock.assert_async().await;

	assert_eq!(err.client_kind(), Some(ClientErrorKind::AuthSchemeMismatch));
	assert!(err.to_string().contains("Expected: [pop]\nActual: [Bearer]"));
	assert_eq!(pop_manager.creations(), 1);
}

#[tokio::test]
async fn missing_tokens_are_reported_together() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"access-1\",\"token_type\":\"Bearer\",\"expires_in\":3600}");
		})
		.await;

	let strategy =
		OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), test_strategy_parameters())
			.await
			.expect("Strategy should build against the mock authority.");
	let token_request = strategy
		.create_grant_request(
			CLIENT_ID,
			TokenGrant::RefreshToken(TokenSecret::new("refresh-0")),
			None,
			&AuthenticationScheme::Bearer,
		)
		.expect("Refresh request should build.");
	let err = strategy
		.request_token(&token_request)
		.await
		.expect_err("Response without id_token and refresh_token should fail validation.");

	assert_eq!(err.client_kind(), Some(ClientErrorKind::TokensMissing));
	assert!(err.to_string().contains("Missing required tokens of type: id_token, refresh_token"));
}

#[tokio::test]
async fn unreadable_error_body_falls_back_to_status() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(503).header("content-type", "text/html").body("<html>busy</html>");
		})
		.await;

	let strategy =
		OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), test_strategy_parameters())
			.await
			.expect("Strategy should build against the mock authority.");
	let token_request = strategy
		.create_token_request(&authorization_request(), &authorization_response(&[]))
		.expect("Token request should build from the redirect.");
	let result = strategy
		.request_token(&token_request)
		.await
		.expect("Error statuses should come back as a failed result.");
	let error = result.error_response().expect("Result should carry an error payload.");

	assert!(!result.is_success());
	assert_eq!(error.error, "503");
	assert_eq!(error.status_code, Some(503));
	assert_eq!(error.response_body.as_deref(), Some("<html>busy</html>"));
}

#[tokio::test]
async fn pkeyauth_challenge_is_answered_once() {
	let server = MockServer::start_async().await;
	let challenge = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).header("x-ms-PKeyAuth", "1.0").header_missing("authorization");
			then.status(401).header(
				"www-authenticate",
				"PKeyAuth Nonce=\"n1\", Version=\"1.0\", Context=\"ctx-1\", CertThumbprint=\"ABCDEF\"",
			);
		})
		.await;
	let answer = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).header_exists("authorization");
			then.status(200).header("content-type", "application/json").body(token_body("Bearer"));
		})
		.await;
	let telemetry = Arc::new(MemoryTelemetry::default());
	let params = test_strategy_parameters()
		.telemetry(telemetry.clone())
		.certificate_provider(Arc::new(FakeDeviceCertificate {
			thumbprint: "abcdef".into(),
			issuer: "CN=Contoso Device CA".into(),
		}));
	let strategy = OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), params)
		.await
		.expect("Strategy should build against the mock authority.");
	let token_request = strategy
		.create_token_request(&authorization_request(), &authorization_response(&[]))
		.expect("Token request should build from the redirect.");

	assert!(token_request.pkey_auth_header_allowed);

	let result =
		strategy.request_token(&token_request).await.expect("Challenge should be answered.");

	challenge.assert_calls_async(1).await;
	answer.assert_calls_async(1).await;

	assert!(result.is_success());
	assert!(
		telemetry
			.events()
			.iter()
			.any(|event| matches!(event, TelemetryEvent::PKeyAuthChallenge { .. }))
	);
}

#[tokio::test]
async fn repeated_pkeyauth_challenge_is_surfaced() {
	let server = MockServer::start_async().await;
	let challenge = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(401).header(
				"www-authenticate",
				"PKeyAuth Nonce=\"n1\", Version=\"1.0\", Context=\"ctx-1\", CertThumbprint=\"ABCDEF\"",
			);
		})
		.await;
	let params = test_strategy_parameters().certificate_provider(Arc::new(FakeDeviceCertificate {
		thumbprint: "abcdef".into(),
		issuer: "CN=Contoso Device CA".into(),
	}));
	let strategy = OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), params)
		.await
		.expect("Strategy should build against the mock authority.");
	let token_request = strategy
		.create_token_request(&authorization_request(), &authorization_response(&[]))
		.expect("Token request should build from the redirect.");
	let result = strategy
		.request_token(&token_request)
		.await
		.expect("A second challenge should come back as a failed result.");

	challenge.assert_calls_async(2).await;

	assert!(!result.is_success());
	assert_eq!(result.error_response().and_then(|error| error.status_code), Some(401));
}

#[tokio::test]
async fn multiple_cloud_support_moves_token_endpoint() {
	let server = MockServer::start_async().await;
	let config = test_configuration_builder(&server.base_url())
		.multiple_cloud_support(true)
		.build()
		.expect("Configuration should build.");
	let strategy = OAuth2Strategy::microsoft_sts(config, test_strategy_parameters())
		.await
		.expect("Strategy should build against the mock authority.");

	assert_eq!(strategy.token_endpoint().host_str(), Some("127.0.0.1"));

	let token_request = strategy
		.create_token_request(
			&authorization_request(),
			&authorization_response(&[("cloud_instance_host_name", "localhost")]),
		)
		.expect("Token request should build from the redirect.");
	let endpoint = strategy.token_endpoint();

	assert_eq!(endpoint.host_str(), Some("localhost"));
	assert_eq!(endpoint.port(), Some(server.port()));
	assert_eq!(endpoint.path(), TOKEN_PATH);
	assert_eq!(token_request.grant_type, GrantType::AuthorizationCode);
}

#[tokio::test]
async fn cloud_host_is_ignored_without_multiple_cloud_support() {
	let server = MockServer::start_async().await;
	let strategy =
		OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), test_strategy_parameters())
			.await
			.expect("Strategy should build against the mock authority.");

	strategy
		.create_token_request(
			&authorization_request(),
			&authorization_response(&[("cloud_instance_host_name", "login.microsoftonline.us")]),
		)
		.expect("Token request should build from the redirect.");

	assert_eq!(strategy.token_endpoint().host_str(), Some("127.0.0.1"));
}

#[tokio::test]
async fn cached_pop_record_follows_device_key() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(token_body("pop"));
		})
		.await;

	let pop_manager = Arc::new(FakePopManager::default());
	let params = test_strategy_parameters().pop_manager(pop_manager.clone());
	let strategy = OAuth2Strategy::microsoft_sts(test_configuration(&server.base_url()), params)
		.await
		.expect("Strategy should build against the mock authority.");
	let request = AuthorizationRequest::builder(CLIENT_ID, REDIRECT_URI)
		.state("S1")
		.scope("user.read")
		.authentication_scheme(AuthenticationScheme::Pop)
		.build();
	let token_request = strategy
		.create_token_request(&request, &authorization_response(&[]))
		.expect("Pop token request should build.");
	let result = strategy.request_token(&token_request).await.expect("Pop request should succeed.");
	let record = strategy
		.cache_record(CLIENT_ID, &AuthenticationScheme::Pop, &result)
		.expect("Cache record should build.")
		.expect("Successful result should produce a record.");

	assert_eq!(record.kid.as_deref(), Some("fake-device-kid"));

	let cache = MemoryTokenCache::default();
	let key: CacheKey = record.key.clone();

	cache.save(record).await.expect("Memory cache save should succeed.");

	let cached = cache
		.load(&key)
		.await
		.expect("Memory cache load should succeed.")
		.expect("Saved record should be present.");

	assert!(strategy.validate_cached_result(&AuthenticationScheme::Pop, &cached));
	assert!(strategy.validate_cached_result(&AuthenticationScheme::Bearer, &cached));
	assert!(!strategy.validate_cached_result(
		&AuthenticationScheme::PopWithClientKey { req_cnf: "cnf".into(), kid: "other-kid".into() },
		&cached
	));
	assert!(!cached.is_expired(OffsetDateTime::now_utc()));
}
