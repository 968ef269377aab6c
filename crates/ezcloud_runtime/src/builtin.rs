//! Built-in operation dispatch.
//!
//! When an inbound request names one of these operations (and targets the
//! root function directory), its body is bound directly to the matching
//! handler instead of a stored code record. The set is a closed
//! enumeration; dispatch is an exhaustive `match`.

use crate::context::ScfRecord;
use crate::crypto::CryptoSuite;
use crate::sandbox::{SandboxSession, ScriptEvaluator};
use ezcloud_core::{CloudError, CloudResult, Envelope};
use ezcloud_gql::{ArgMap, ArgValue};
use ezcloud_sdk::{
    AggregateInput, FindInput, MutationGetFirstOneInput, MutationInput, OperateInput, QueryInput,
    RunGqlInput,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// The built-in operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Operate,
    Query,
    Mutation,
    Find,
    Aggregate,
    QueryGetFirstOne,
    MutationGetFirstOne,
    RunGql,
    RunScfCode,
    CallActionflow,
    CallThirdapi,
    UploadMedia,
    PushScf,
    PullScf,
    RemoveScf,
    DeveloperLogin,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Self::Operate,
        Self::Query,
        Self::Mutation,
        Self::Find,
        Self::Aggregate,
        Self::QueryGetFirstOne,
        Self::MutationGetFirstOne,
        Self::RunGql,
        Self::RunScfCode,
        Self::CallActionflow,
        Self::CallThirdapi,
        Self::UploadMedia,
        Self::PushScf,
        Self::PullScf,
        Self::RemoveScf,
        Self::DeveloperLogin,
    ];

    /// The wire name of the operation.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Operate => "operate",
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Find => "find",
            Self::Aggregate => "aggregate",
            Self::QueryGetFirstOne => "queryGetFirstOne",
            Self::MutationGetFirstOne => "mutationGetFirstOne",
            Self::RunGql => "runGql",
            Self::RunScfCode => "runScfCode",
            Self::CallActionflow => "callActionflow",
            Self::CallThirdapi => "callThirdapi",
            Self::UploadMedia => "uploadMedia",
            Self::PushScf => "pushScf",
            Self::PullScf => "pullScf",
            Self::RemoveScf => "removeScf",
            Self::DeveloperLogin => "developerLogin",
        }
    }

    /// Resolves a request name to a built-in.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }
}

/// Executes a built-in against the request payload.
///
/// Most arms wrap the facade result into a success envelope; `runScfCode`
/// returns the sandbox envelope verbatim. Errors map onto `-1`/`-2`
/// envelopes at the caller.
pub fn execute(
    builtin: Builtin,
    session: &SandboxSession,
    evaluator: &dyn ScriptEvaluator,
) -> CloudResult<Envelope> {
    let payload = session.ctx.borrow().request.payload.clone();
    tracing::debug!(builtin = builtin.name(), "dispatching built-in");
    let facade = session.facade();

    match builtin {
        Builtin::Operate => {
            let result = facade.operate(parse(payload)?)?;
            ok_value(result)
        }
        Builtin::Query => {
            let input: QueryInput = parse(payload)?;
            ok_value(facade.query(input)?)
        }
        Builtin::Mutation => {
            let input: MutationInput = parse(payload)?;
            Ok(Envelope::ok(facade.mutation(input)?))
        }
        Builtin::Find => {
            let input: FindInput = parse(payload)?;
            ok_value(facade.find(input)?)
        }
        Builtin::Aggregate => {
            let input: AggregateInput = parse(payload)?;
            Ok(Envelope::ok(facade.aggregate(input)?))
        }
        Builtin::QueryGetFirstOne => {
            let input: QueryInput = parse(payload)?;
            Ok(Envelope::ok(
                facade.query_get_first_one(input)?.unwrap_or(Value::Null),
            ))
        }
        Builtin::MutationGetFirstOne => {
            let input: MutationGetFirstOneInput = parse(payload)?;
            Ok(Envelope::ok(
                facade
                    .mutation_get_first_one(input)?
                    .unwrap_or(Value::Null),
            ))
        }
        Builtin::RunGql => {
            let input: RunGqlInput = parse(payload)?;
            Ok(Envelope::ok(facade.run_gql(input)?))
        }
        Builtin::RunScfCode => {
            let input: RunScfCodePayload = parse(payload)?;
            Ok(evaluator.run(&input.scf_code, session))
        }
        Builtin::CallActionflow => {
            let input: ActionflowPayload = parse(payload)?;
            let raw = session.host.call_action_flow(
                &input.action_flow_id,
                input.version_id,
                &input.args,
            )?;
            Ok(Envelope::ok(raw))
        }
        Builtin::CallThirdapi => {
            let input: ThirdapiPayload = parse(payload)?;
            let operation_id = match input.operation_id {
                Some(id) => id,
                None => session.ctx.borrow().system.thirdapi_id.clone(),
            };
            let raw = session
                .host
                .call_third_party_api(&operation_id, &input.args)?;
            Ok(Envelope::ok(raw))
        }
        Builtin::UploadMedia => {
            let input: UploadMediaPayload = parse(payload)?;
            let raw = session.host.upload_media(&input.url, &input.headers)?;
            Ok(Envelope::ok(raw))
        }
        Builtin::PushScf => push_scf(session, payload),
        Builtin::PullScf => pull_scf(session, payload),
        Builtin::RemoveScf => remove_scf(session, payload),
        Builtin::DeveloperLogin => developer_login(session, payload),
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> CloudResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| CloudError::payload(format!("invalid payload: {e}")))
}

fn ok_value<T: serde::Serialize>(value: T) -> CloudResult<Envelope> {
    let data = serde_json::to_value(value)
        .map_err(|e| CloudError::framework(format!("unserializable result: {e}")))?;
    Ok(Envelope::ok(data))
}

#[derive(Deserialize)]
struct RunScfCodePayload {
    #[serde(default)]
    scf_code: String,
}

#[derive(Deserialize)]
struct ActionflowPayload {
    #[serde(rename = "actionFlowId", default)]
    action_flow_id: String,
    #[serde(rename = "versionId", default)]
    version_id: Option<i64>,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
struct ThirdapiPayload {
    #[serde(default)]
    operation_id: Option<String>,
    #[serde(default, alias = "data")]
    args: Value,
}

#[derive(Deserialize)]
struct UploadMediaPayload {
    #[serde(default)]
    url: String,
    #[serde(default)]
    headers: Value,
}

const SCF_COLUMNS: &str = "id scf_dir scf_name scf_code parameters returns description";

#[derive(Deserialize)]
struct PushScfPayload {
    #[serde(default)]
    scf_dir: String,
    #[serde(default)]
    is_overwrite: bool,
    #[serde(default)]
    scfs: Value,
}

fn push_scf(session: &SandboxSession, payload: Value) -> CloudResult<Envelope> {
    let input: PushScfPayload = parse(payload)?;
    let records = match input.scfs {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    let objects: Vec<ArgValue> = records
        .into_iter()
        .map(|record| {
            let mut object: ArgMap = match &record {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| (k.clone(), ArgValue::from(v)))
                    .collect(),
                _ => ArgMap::new(),
            };
            object.insert("scf_dir".to_string(), input.scf_dir.clone().into());
            ArgValue::Object(object)
        })
        .collect();

    let mut args = ArgMap::new();
    args.insert("objects".to_string(), ArgValue::List(objects));
    if input.is_overwrite {
        let mut conflict = ArgMap::new();
        conflict.insert(
            "constraint".to_string(),
            ArgValue::raw("ez_scf_scf_dir_scf_name_key"),
        );
        conflict.insert(
            "update_columns".to_string(),
            ArgValue::List(vec![
                ArgValue::raw("scf_code"),
                ArgValue::raw("parameters"),
                ArgValue::raw("returns"),
                ArgValue::raw("description"),
            ]),
        );
        args.insert("on_conflict".to_string(), ArgValue::Object(conflict));
    }

    let response = session.facade().mutation(MutationInput {
        name: "insert_ez_scf".to_string(),
        args,
        fields: Some("affected_rows".into()),
        ..MutationInput::default()
    })?;
    Ok(Envelope::ok(response))
}

#[derive(Deserialize)]
struct ScfSelectorPayload {
    #[serde(default)]
    scf_dir: String,
    #[serde(default)]
    scf_name: Option<String>,
}

fn scf_where(input: &ScfSelectorPayload) -> ArgValue {
    let mut clauses = ArgMap::new();
    let mut dir_eq = ArgMap::new();
    dir_eq.insert("_eq".to_string(), input.scf_dir.clone().into());
    clauses.insert("scf_dir".to_string(), ArgValue::Object(dir_eq));
    if let Some(name) = &input.scf_name {
        let mut name_eq = ArgMap::new();
        name_eq.insert("_eq".to_string(), name.clone().into());
        clauses.insert("scf_name".to_string(), ArgValue::Object(name_eq));
    }
    ArgValue::Object(clauses)
}

fn pull_scf(session: &SandboxSession, payload: Value) -> CloudResult<Envelope> {
    let input: ScfSelectorPayload = parse(payload)?;
    let mut args = ArgMap::new();
    args.insert("where".to_string(), scf_where(&input));
    let rows = session.facade().query(QueryInput {
        name: "ez_scf".to_string(),
        args,
        fields: Some(SCF_COLUMNS.into()),
        ..QueryInput::default()
    })?;
    ok_value(rows)
}

fn remove_scf(session: &SandboxSession, payload: Value) -> CloudResult<Envelope> {
    let input: ScfSelectorPayload = parse(payload)?;
    let mut args = ArgMap::new();
    args.insert("where".to_string(), scf_where(&input));
    let response = session.facade().mutation(MutationInput {
        name: "delete_ez_scf".to_string(),
        args,
        fields: Some("affected_rows".into()),
        ..MutationInput::default()
    })?;
    Ok(Envelope::ok(response))
}

#[derive(Deserialize)]
struct LoginPayload {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Verifies credentials against `ez_developer` and issues a token.
fn developer_login(session: &SandboxSession, payload: Value) -> CloudResult<Envelope> {
    let input: LoginPayload = parse(payload)?;

    let mut username_eq = ArgMap::new();
    username_eq.insert("_eq".to_string(), input.username.clone().into());
    let mut clauses = ArgMap::new();
    clauses.insert("username".to_string(), ArgValue::Object(username_eq));
    let mut args = ArgMap::new();
    args.insert("where".to_string(), ArgValue::Object(clauses));

    let developer = session.facade().query_get_first_one(QueryInput {
        name: "ez_developer".to_string(),
        args,
        fields: Some("id username password allow_scfs deny_scfs".into()),
        ..QueryInput::default()
    })?;

    let stored = developer
        .as_ref()
        .and_then(|row| row.get("password"))
        .and_then(Value::as_str);
    if stored != Some(CryptoSuite::md5_hex(&input.password).as_str()) {
        return Ok(Envelope::fail(
            -1,
            "invalid username or password",
            Value::Null,
        ));
    }

    let token = session
        .crypto
        .gen_jwt(&json!({ "sub": input.username }))?;
    let claims = session.crypto.parse_jwt(&token)?;
    Ok(Envelope::ok(json!({
        "developer_token": token,
        "expires_in": claims["expires_in"],
    })))
}

/// Resolves a built-in into a bound function record.
pub fn bind_record(builtin: Builtin, scf_name: &str, scf_dir: &str) -> ScfRecord {
    ScfRecord {
        scf_dir: scf_dir.to_string(),
        scf_name: scf_name.to_string(),
        scf_fn: Some(builtin),
        ..ScfRecord::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_round_trips() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(*builtin));
        }
        assert_eq!(Builtin::from_name("fetchApi"), None);
        assert_eq!(Builtin::from_name(""), None);
    }

    #[test]
    fn test_names_are_wire_names() {
        assert_eq!(Builtin::QueryGetFirstOne.name(), "queryGetFirstOne");
        assert_eq!(Builtin::DeveloperLogin.name(), "developerLogin");
    }
}
