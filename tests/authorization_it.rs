#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_sts_client::{
	_preludet::*,
	error::ClientErrorKind,
	obs::{MemoryTelemetry, TelemetryEvent},
	protocol::{AuthorizationRequest, AuthorizationStatus, GrantType},
	strategy::OAuth2Strategy,
};

const CLIENT_ID: &str = "client-authorize";
const REDIRECT_URI: &str = "https://app.contoso.com/callback";
const DEVICE_CODE_PATH: &str = "/common/oAuth2/v2.0/devicecode";

fn request() -> AuthorizationRequest {
	AuthorizationRequest::builder(CLIENT_ID, REDIRECT_URI)
		.state("S1")
		.scope("user.read")
		.correlation_id("corr-authorize")
		.build()
}

async fn strategy(server: &MockServer, telemetry: Arc<MemoryTelemetry>) -> OAuth2Strategy {
	OAuth2Strategy::microsoft_sts(
		test_configuration(&server.base_url()),
		test_strategy_parameters().telemetry(telemetry),
	)
	.await
	.expect("Strategy should build against the mock authority.")
}

#[tokio::test]
async fn redirect_with_code_becomes_success() {
	let server = MockServer::start_async().await;
	let telemetry = Arc::new(MemoryTelemetry::default());
	let strategy = strategy(&server, telemetry.clone()).await;
	let surface = RedirectingAuthorizationStrategy::new(format!("{REDIRECT_URI}?code=ABC123&state=S1"));
	let request = request();
	let result = strategy
		.request_authorization(&request, &surface)
		.await
		.expect("Authorization should complete.");
	let response = result.response().expect("Success should carry a response.");

	assert_eq!(result.status(), AuthorizationStatus::Success);
	assert_eq!(response.code.as_deref(), Some("ABC123"));
	assert_eq!(response.state.as_deref(), Some("S1"));

	let shown = surface.shown.lock().clone();
	let pairs: HashMap<_, _> = shown[0].query_pairs().into_owned().collect();

	assert_eq!(shown[0].path(), "/common/oAuth2/v2.0/authorize");
	assert_eq!(pairs.get("client_id"), Some(&CLIENT_ID.into()));
	assert_eq!(pairs.get("state"), Some(&"S1".into()));
	assert_eq!(pairs.get("code_challenge_method"), Some(&"S256".into()));
	assert_eq!(
		pairs.get("code_challenge").map(String::as_str),
		request.pkce.as_ref().map(|pkce| pkce.code_challenge())
	);
	assert_eq!(
		telemetry.events(),
		vec![TelemetryEvent::UiShown { correlation_id: Some("corr-authorize".into()) }]
	);

	let token_request = strategy
		.create_token_request(&request, response)
		.expect("Token request should build from the redirect.");

	assert_eq!(token_request.grant_type, GrantType::AuthorizationCode);
	assert_eq!(
		token_request.code_verifier.as_ref().map(|verifier| verifier.expose()),
		request.pkce.as_ref().map(|pkce| pkce.code_verifier())
	);
}

#[tokio::test]
async fn access_denied_redirect_becomes_failure() {
	let server = MockServer::start_async().await;
	let strategy = strategy(&server, Default::default()).await;
	let surface = RedirectingAuthorizationStrategy::new(format!(
		"{REDIRECT_URI}?error=access_denied&error_description=User+declined&state=S1"
	));
	let result = strategy
		.request_authorization(&request(), &surface)
		.await
		.expect("Authorization should complete.");
	let error = result.error_response().expect("Failure should carry an error.");

	assert_eq!(result.status(), AuthorizationStatus::Fail);
	assert_eq!(error.error, "access_denied");
	assert_eq!(error.error_description.as_deref(), Some("User declined"));
}

#[tokio::test]
async fn state_mismatch_is_rejected() {
	let server = MockServer::start_async().await;
	let strategy = strategy(&server, Default::default()).await;
	let surface = RedirectingAuthorizationStrategy::new(format!("{REDIRECT_URI}?code=ABC123&state=other"));
	let result = strategy
		.request_authorization(&request(), &surface)
		.await
		.expect("Authorization should complete.");

	assert_eq!(result.status(), AuthorizationStatus::Fail);
	assert_eq!(result.error_response().map(|e| e.error.as_str()), Some("state_mismatch"));
}

#[tokio::test]
async fn invalid_authorization_request_never_reaches_the_surface() {
	let server = MockServer::start_async().await;
	let strategy = strategy(&server, Default::default()).await;
	let surface = RedirectingAuthorizationStrategy::new(REDIRECT_URI);
	let request = AuthorizationRequest::builder("", REDIRECT_URI).state("S1").build();
	let err = strategy
		.request_authorization(&request, &surface)
		.await
		.expect_err("A missing client id should be rejected.");

	assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidRequest));
	assert!(surface.shown.lock().is_empty());
}

#[tokio::test]
async fn device_code_success_and_server_error() {
	let server = MockServer::start_async().await;
	let strategy = strategy(&server, Default::default()).await;
	let mut success = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(DEVICE_CODE_PATH)
				.header("client-request-id", "corr-authorize")
				.body_includes("client_id=client-authorize")
				.body_includes("scope=user.read");
			then.status(200).header("content-type", "application/json").body(
				"{\"device_code\":\"dc-1\",\"user_code\":\"UC-1\",\"verification_uri\":\"https://microsoft.com/devicelogin\",\"expires_in\":900,\"interval\":5,\"message\":\"Go sign in.\"}",
			);
		})
		.await;
	let result = strategy
		.request_device_code(&request())
		.await
		.expect("Device code request should complete.");
	let device_code = result
		.response()
		.and_then(|response| response.device_code.as_ref())
		.expect("Success should carry the device code.");

	success.assert_async().await;

	assert_eq!(device_code.user_code, "UC-1");
	assert_eq!(device_code.interval, Some(5));

	let token_request = strategy
		.create_token_request(&request(), result.response().expect("Response should be present."))
		.expect("Device code token request should build.");

	assert_eq!(token_request.grant_type, GrantType::DeviceCode);
	assert_eq!(token_request.device_code.as_ref().map(|code| code.expose()), Some("dc-1"));

	success.delete_async().await;
	server
		.mock_async(|when, then| {
			when.method(POST).path(DEVICE_CODE_PATH);
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_scope\",\"error_description\":\"Scope is not valid.\"}",
			);
		})
		.await;

	let result = strategy
		.request_device_code(&request())
		.await
		.expect("Server errors should come back as a failed result.");

	assert_eq!(result.status(), AuthorizationStatus::Fail);
	assert_eq!(result.error_response().map(|e| e.error.as_str()), Some("invalid_scope"));
}
