//! Integration tests for the request lifecycle.

use ezcloud_core::{CloudError, CloudResult};
use ezcloud_runtime::{CryptoSuite, GqlPermission, HostCapabilities, Lifecycle};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Host double backed by canned table rows.
#[derive(Default)]
struct MockHost {
    args: HashMap<String, Value>,
    system_rows: Vec<Value>,
    scf_rows: Vec<Value>,
    developer_rows: Vec<Value>,
    /// (document substring, response) pairs checked in order.
    canned: Vec<(String, Value)>,
    fail_log_insert: bool,
    gql_log: RefCell<Vec<(String, Value)>>,
    returned: RefCell<HashMap<String, Value>>,
}

impl MockHost {
    fn new(scf_name: &str, scf_dir: &str, payload: Value) -> Self {
        let mut host = Self::default();
        host.args.insert("scf_name".to_string(), json!(scf_name));
        host.args.insert("scf_dir".to_string(), json!(scf_dir));
        host.args.insert("payload".to_string(), payload);
        host.args.insert("clientinfo".to_string(), json!({}));
        host
    }

    fn with_scf(mut self, code: &str) -> Self {
        let name = self.args["scf_name"].clone();
        let dir = self.args["scf_dir"].clone();
        self.scf_rows = vec![json!({
            "id": 1,
            "scf_dir": dir,
            "scf_name": name,
            "scf_code": code,
            "parameters": {},
            "returns": {},
            "description": "",
        })];
        self
    }

    fn with_system(mut self, row: Value) -> Self {
        self.system_rows = vec![row];
        self
    }

    fn with_clientinfo(mut self, clientinfo: Value) -> Self {
        self.args.insert("clientinfo".to_string(), clientinfo);
        self
    }

    fn with_canned(mut self, needle: &str, response: Value) -> Self {
        self.canned.push((needle.to_string(), response));
        self
    }

    fn documents(&self) -> Vec<String> {
        self.gql_log.borrow().iter().map(|(d, _)| d.clone()).collect()
    }
}

impl HostCapabilities for MockHost {
    fn get_arg(&self, name: &str) -> CloudResult<Value> {
        Ok(self.args.get(name).cloned().unwrap_or(Value::Null))
    }

    fn set_return(&self, name: &str, value: &Value) -> CloudResult<()> {
        self.returned
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn run_gql(
        &self,
        _operation_name: Option<&str>,
        document: &str,
        variables: &Value,
        _permission: &GqlPermission,
    ) -> CloudResult<Value> {
        self.gql_log
            .borrow_mut()
            .push((document.to_string(), variables.clone()));

        if document.contains("insert_ez_logs_one") {
            if self.fail_log_insert {
                return Err(CloudError::host("log insert failed"));
            }
            return Ok(json!({ "data": { "response": { "id": 101 } } }));
        }
        if document.contains("update_ez_logs_by_pk") {
            return Ok(json!({ "data": { "response": { "id": 101 } } }));
        }
        if document.contains("ez_developer") {
            return Ok(json!({ "data": { "response": self.developer_rows } }));
        }
        if document.contains("ez_system") {
            return Ok(json!({ "data": { "response": self.system_rows } }));
        }
        if document.contains("response: ez_scf") {
            return Ok(json!({ "data": { "response": self.scf_rows } }));
        }
        for (needle, response) in &self.canned {
            if document.contains(needle) {
                return Ok(response.clone());
            }
        }
        Ok(json!({ "data": { "response": [] } }))
    }

    fn call_third_party_api(&self, _operation_id: &str, _args: &Value) -> CloudResult<Value> {
        Ok(json!({}))
    }

    fn call_action_flow(
        &self,
        _flow_id: &str,
        _version: Option<i64>,
        _args: &Value,
    ) -> CloudResult<Value> {
        Ok(json!({ "code": 0, "msg": "success", "data": null }))
    }

    fn upload_media(&self, _url: &str, _headers: &Value) -> CloudResult<Value> {
        Ok(json!({}))
    }
}

#[test]
fn test_stored_function_runs_to_success() {
    let host = Rc::new(
        MockHost::new("hello", "api", json!({})).with_scf("ezcloud.success(#{x: 1}, \"ok\");"),
    );
    let mut lifecycle = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>);
    let response = lifecycle.start();

    assert_eq!(response.code, 0);
    assert_eq!(response.msg, "ok");
    assert_eq!(response.data, json!({ "x": 1 }));

    let returned = host.returned.borrow();
    assert_eq!(returned["code"], json!(0));
    assert_eq!(returned["msg"], json!("ok"));
    assert_eq!(returned["data"], json!({ "x": 1 }));
}

#[test]
fn test_missing_function_is_a_soft_miss() {
    let host = Rc::new(MockHost::new("nope", "api", json!({})));
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, -1);
    assert_eq!(response.msg, "api/nope not found");
    assert_eq!(host.returned.borrow()["code"], json!(-1));
}

#[test]
fn test_builtin_query_dispatch() {
    let host = Rc::new(
        MockHost::new("query", ".", json!({ "name": "account", "fields": "id" })).with_canned(
            "response: account",
            json!({ "data": { "response": [{ "id": 1 }] } }),
        ),
    );
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, 0);
    assert_eq!(response.data, json!([{ "id": 1 }]));
}

#[test]
fn test_developer_auth_denies_without_token() {
    let host = Rc::new(
        MockHost::new("query", ".", json!({ "name": "account", "fields": "id" }))
            .with_system(json!({ "is_developer_auth": true })),
    );
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, -1);
    assert_eq!(response.msg, "permission denied");
    // The built-in body never executed.
    assert!(host
        .documents()
        .iter()
        .all(|doc| !doc.contains("response: account")));
}

#[test]
fn test_developer_auth_accepts_valid_token() {
    let token = CryptoSuite::default()
        .gen_jwt(&json!({ "sub": "dev" }))
        .unwrap();
    let mut host = MockHost::new("query", ".", json!({ "name": "account", "fields": "id" }))
        .with_system(json!({ "is_developer_auth": true }))
        .with_clientinfo(json!({ "developer_token": token }))
        .with_canned(
            "response: account",
            json!({ "data": { "response": [{ "id": 7 }] } }),
        );
    host.developer_rows = vec![json!({
        "id": 1,
        "username": "dev",
        "allow_scfs": ["*"],
        "deny_scfs": [],
    })];
    let host = Rc::new(host);
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, 0);
    assert_eq!(response.data, json!([{ "id": 7 }]));
}

#[test]
fn test_audit_logging_inserts_and_updates() {
    let host = Rc::new(
        MockHost::new("hello", "api", json!({ "k": "v" }))
            .with_system(json!({ "is_logs": true }))
            .with_scf("ezcloud.success(#{}, \"ok\");"),
    );
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();
    assert_eq!(response.code, 0);

    let documents = host.documents();
    let insert = documents
        .iter()
        .find(|d| d.contains("insert_ez_logs_one"))
        .expect("audit insert issued");
    assert!(insert.contains("payload: $payload"));
    assert!(insert.contains("$payload: jsonb"));

    let update = documents
        .iter()
        .find(|d| d.contains("update_ez_logs_by_pk"))
        .expect("audit update issued");
    assert!(update.contains("$data: jsonb"));
    assert!(update.contains("data: $data"));

    // The insert carried the actual payload as a variable.
    let logs = host.gql_log.borrow();
    let (_, variables) = logs
        .iter()
        .find(|(d, _)| d.contains("insert_ez_logs_one"))
        .unwrap();
    assert_eq!(variables["payload"], json!({ "k": "v" }));
}

#[test]
fn test_log_insert_failure_is_recoverable() {
    let mut host = MockHost::new("hello", "api", json!({}))
        .with_system(json!({ "is_logs": true }))
        .with_scf("ezcloud.success(#{x: 1}, \"ok\");");
    host.fail_log_insert = true;
    let host = Rc::new(host);
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, 0);
    assert_eq!(response.data["x"], json!(1));
    let errors = response.data["_errors"].as_array().expect("errors attached");
    assert_eq!(errors[0]["source"], json!("logs"));
}

#[test]
fn test_pre_hook_short_circuits_body() {
    let host = Rc::new(
        MockHost::new("hello", "api", json!({}))
            .with_system(json!({ "pre_hook_code": "ezcloud.fail(#{}, \"blocked\", -9);" }))
            .with_scf("ezcloud.success(#{}, \"should_not_run\");"),
    );
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, -9);
    assert_eq!(response.msg, "blocked");
}

#[test]
fn test_post_hook_observes_body_response() {
    let host = Rc::new(
        MockHost::new("hello", "api", json!({}))
            .with_system(json!({
                "post_hook_code": "let r = ezcloud.getResponse();\nezcloud.success(r.data, \"wrapped\");"
            }))
            .with_scf("ezcloud.success(#{x: 2}, \"ok\");"),
    );
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, 0);
    assert_eq!(response.msg, "wrapped");
    assert_eq!(response.data, json!({ "x": 2 }));
}

#[test]
fn test_start_is_not_reentrant() {
    let host = Rc::new(
        MockHost::new("hello", "api", json!({})).with_scf("ezcloud.success(#{x: 1}, \"ok\");"),
    );
    let mut lifecycle = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>);
    let first = lifecycle.start();
    let issued = host.documents().len();

    let second = lifecycle.start();
    assert_eq!(first, second);
    assert_eq!(host.documents().len(), issued);
}

#[test]
fn test_user_code_error_yields_minus_one() {
    let host = Rc::new(MockHost::new("hello", "api", json!({})).with_scf("throw \"kaboom\";"));
    let response = Lifecycle::new(Rc::clone(&host) as Rc<dyn HostCapabilities>).start();

    assert_eq!(response.code, -1);
    assert_eq!(response.msg, "kaboom");
    assert!(response.data["info"]["_stack"].is_string());
}
