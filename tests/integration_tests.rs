use httpmock::prelude::*;
use parking_lot::Mutex;
use reste::{
    callback, json, ChannelDeferred, Config, HeaderValue, MethodDescriptor, Outcome, Params, RestError, Reste, Verb,
};
use serde_json::Value;
use std::sync::Arc;

fn params(value: Value) -> Params {
    value.as_object().cloned().expect("params must be an object")
}

fn recorder() -> (Arc<Mutex<Vec<Value>>>, reste::OnLoad) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, callback::on_load(move |value| sink.lock().push(value)))
}

#[test]
fn test_get_user() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/users/7");
        then.status(200)
            .header("Content-Type", "application/json")
            .body(r#"{"id":7,"name":"Ann"}"#);
    });

    let config = Config::new(server.base_url())
        .with_method(MethodDescriptor::new("getUser", Verb::Get, "/users/<id>"));
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    let handle = api.call("getUser", params(json!({"id": 7})), Some(cb), None).unwrap();

    mock.assert();
    assert_eq!(*seen.lock(), vec![json!({"id": 7, "name": "Ann"})]);
    let exchange = handle.exchange().unwrap();
    assert_eq!(exchange.outcome, Outcome::Loaded);
    assert_eq!(exchange.url, format!("{}/users/7", server.base_url()));
}

#[test]
fn test_plain_text_response() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/motd");
        then.status(200).body("plain text");
    });

    let config = Config::new(server.base_url())
        .with_method(MethodDescriptor::new("motd", Verb::Get, "/motd"));
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    api.call_with("motd", cb).unwrap();

    mock.assert();
    assert_eq!(*seen.lock(), vec![json!("plain text")]);
}

#[test]
fn test_global_and_method_headers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/me")
            .header("X-Api-Key", "secret")
            .header("Authorization", "Bearer t1")
            .header("Accept", "text/plain");
        then.status(200).json_body(json!({"ok": true}));
    });

    let token = Arc::new(Mutex::new("t1".to_string()));
    let current = token.clone();
    let config = Config::new(server.base_url())
        .with_header("X-Api-Key", "secret")
        .with_header("Accept", "application/json")
        .with_header(
            "Authorization",
            HeaderValue::computed(move || format!("Bearer {}", current.lock())),
        )
        .with_method(MethodDescriptor::new("me", Verb::Get, "/me").with_header("Accept", "text/plain"));
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    api.call_with("me", cb).unwrap();

    mock.assert();
    assert_eq!(*seen.lock(), vec![json!({"ok": true})]);
}

#[test]
fn test_post_sends_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/users")
            .header("Content-Type", "application/json")
            .json_body(json!({"name": "Ann"}));
        then.status(201).json_body(json!({"id": 1, "name": "Ann"}));
    });

    let config = Config::new(server.base_url()).with_method(
        MethodDescriptor::new("createUser", Verb::Post, "/users").with_expects(["name"]),
    );
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    api.call("createUser", params(json!({"body": {"name": "Ann"}})), Some(cb), None)
        .unwrap();

    mock.assert();
    assert_eq!(seen.lock()[0]["id"], json!(1));
}

#[test]
fn test_missing_parameter_sends_nothing() {
    // no mocks: any request would come back as an error routed to `cb`
    let server = MockServer::start();

    let config = Config::new(server.base_url()).with_method(
        MethodDescriptor::new("createUser", Verb::Post, "/users").with_expects(["name"]),
    );
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    let err = api
        .call("createUser", params(json!({"body": {}})), Some(cb), None)
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(err.to_string(), "missing parameter name for method createUser");
    assert!(seen.lock().is_empty());
}

#[test]
fn test_error_handler_and_retry() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(500).json_body(json!({"message": "boom"}));
    });

    let config = Config::new(server.base_url())
        .with_errors_as_objects(true)
        .with_method(MethodDescriptor::new("flaky", Verb::Get, "/flaky"));
    let api = Reste::new(config).unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let on_error = callback::on_error(move |error, retry| {
        let attempt = {
            let mut errors = sink.lock();
            errors.push(error);
            errors.len()
        };
        if attempt < 2 {
            retry.send().unwrap();
        }
    });

    let handle = api.call("flaky", Params::new(), None, Some(on_error)).unwrap();

    assert_eq!(handle.exchange().unwrap().outcome, Outcome::Failed);
    let errors = errors.lock();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["code"], json!(500));
    assert_eq!(errors[0]["content"], json!({"message": "boom"}));
    assert_eq!(errors[0]["url"], json!(format!("{}/flaky", server.base_url())));
}

#[test]
fn test_error_falls_back_to_on_load() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404).json_body(json!({"error": "not found"}));
    });

    let config = Config::new(server.base_url())
        .with_method(MethodDescriptor::new("missing", Verb::Get, "/missing"));
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    api.call_with("missing", cb).unwrap();

    assert_eq!(*seen.lock(), vec![json!({"error": "not found"})]);
}

#[test]
fn test_error_without_handler_names_url() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(DELETE).path("/users/3");
        then.status(404);
    });

    let config = Config::new(server.base_url())
        .with_method(MethodDescriptor::new("deleteUser", Verb::Delete, "/users/<id>"));
    let api = Reste::new(config).unwrap();

    let err = api
        .call("deleteUser", params(json!({"id": 3})), None, None)
        .unwrap_err();

    assert!(matches!(err, RestError::NoErrorHandler { .. }));
    assert!(err.to_string().contains(&format!("{}/users/3", server.base_url())));
}

#[test]
fn test_promise_resolves_and_rejects() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/users");
        then.status(200).json_body(json!([{"id": 1}]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/secret");
        then.status(403).json_body(json!({"error": "forbidden"}));
    });

    let config = Config::new(server.base_url())
        .with_deferred(Arc::new(ChannelDeferred))
        .with_method(MethodDescriptor::new("listUsers", Verb::Get, "/users"))
        .with_method(MethodDescriptor::new("secret", Verb::Get, "/secret"));
    let api = Reste::new(config).unwrap();

    let users = api
        .call("listUsers", Params::new(), None, None)
        .unwrap()
        .into_promise()
        .unwrap();
    assert_eq!(users.wait().unwrap(), json!([{"id": 1}]));

    let secret = api
        .call("secret", Params::new(), None, None)
        .unwrap()
        .into_promise()
        .unwrap();
    match secret.wait() {
        Err(RestError::Rejected(body)) => assert_eq!(body, json!({"error": "forbidden"})),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_config_from_json() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/users/9")
            .header("X-Client", "reste")
            .json_body(json!({"name": "Bo"}));
        then.status(200).json_body(json!({"id": 9, "name": "Bo"}));
    });

    let config = Config::from_json(&format!(
        r#"{{
            "url": "{}",
            "timeout": 5000,
            "requestHeaders": {{"X-Client": "reste"}},
            "methods": [{{"name": "updateUser", "put": "/users/<id>", "expects": ["id"]}}]
        }}"#,
        server.base_url()
    ))
    .unwrap();
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    api.call(
        "updateUser",
        params(json!({"id": 9, "body": {"name": "Bo"}})),
        Some(cb),
        None,
    )
    .unwrap();

    mock.assert();
    assert_eq!(seen.lock()[0]["name"], json!("Bo"));
}

#[test]
fn test_cookies_kept_until_cleared() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/login");
        then.status(200)
            .header("Set-Cookie", "session=abc; Path=/")
            .json_body(json!({"ok": true}));
    });
    let me = server.mock(|when, then| {
        when.method(GET).path("/me").header("Cookie", "session=abc");
        then.status(200).json_body(json!({"user": "Ann"}));
    });

    let config = Config::new(server.base_url())
        .with_method(MethodDescriptor::new("login", Verb::Get, "/login"))
        .with_method(MethodDescriptor::new("me", Verb::Get, "/me"));
    let api = Reste::new(config).unwrap();
    let (seen, cb) = recorder();

    api.call_with("login", cb.clone()).unwrap();
    api.call_with("me", cb.clone()).unwrap();
    api.clear_cookies();
    // without the cookie the request misses the mock and comes back as a 404
    api.call_with("me", cb).unwrap();

    me.assert_hits(1);
    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1], json!({"user": "Ann"}));
    assert_ne!(seen[2], json!({"user": "Ann"}));
}
