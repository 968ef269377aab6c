//! The developer permission gate.
//!
//! Applies to built-in dispatch only, and only while
//! `system.is_developer_auth` is set. Every failure mode collapses into
//! the same generic denial; which check failed is never exposed to the
//! caller (it is traced at debug level for operators).

use crate::builtin::Builtin;
use crate::sandbox::SandboxSession;
use ezcloud_core::{CloudError, CloudResult};
use ezcloud_gql::{ArgMap, ArgValue};
use ezcloud_sdk::QueryInput;
use serde_json::Value;

/// Checks whether the current request may invoke `builtin`.
///
/// `developerLogin` itself is always allowed (it is how a token is
/// obtained in the first place).
pub fn authorize(session: &SandboxSession, builtin: Builtin) -> CloudResult<()> {
    if builtin == Builtin::DeveloperLogin {
        return Ok(());
    }

    let (enabled, clientinfo) = {
        let ctx = session.ctx.borrow();
        (
            ctx.system.is_developer_auth,
            ctx.request.clientinfo.clone(),
        )
    };
    if !enabled {
        return Ok(());
    }

    let token = clientinfo
        .get("developer_token")
        .and_then(Value::as_str)
        .ok_or_else(|| denied("no developer token presented"))?;
    let token = token.strip_prefix("Bearer ").unwrap_or(token);

    let claims = session
        .crypto
        .parse_jwt(token)
        .map_err(|e| denied(&e.message))?;
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| denied("token carries no subject"))?;

    let developer = lookup_developer(session, subject)
        .map_err(|e| denied(&e.message))?
        .ok_or_else(|| denied("unknown developer"))?;

    let name = builtin.name();
    if list_contains(developer.get("deny_scfs"), name) {
        return Err(denied("operation is deny-listed"));
    }
    match developer.get("allow_scfs") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(_)) => {
            let allow = developer.get("allow_scfs");
            if list_contains(allow, "*") || list_contains(allow, name) {
                Ok(())
            } else {
                Err(denied("operation is not allow-listed"))
            }
        }
        Some(_) => Err(denied("malformed allow list")),
    }
}

fn lookup_developer(session: &SandboxSession, subject: &str) -> CloudResult<Option<Value>> {
    let mut username_eq = ArgMap::new();
    username_eq.insert("_eq".to_string(), subject.into());
    let mut clauses = ArgMap::new();
    clauses.insert("username".to_string(), ArgValue::Object(username_eq));
    let mut args = ArgMap::new();
    args.insert("where".to_string(), ArgValue::Object(clauses));

    session.facade().query_get_first_one(QueryInput {
        name: "ez_developer".to_string(),
        args,
        fields: Some("id username allow_scfs deny_scfs".into()),
        ..QueryInput::default()
    })
}

fn list_contains(list: Option<&Value>, needle: &str) -> bool {
    list.and_then(Value::as_array)
        .map(|items| items.iter().any(|item| item.as_str() == Some(needle)))
        .unwrap_or(false)
}

fn denied(reason: &str) -> CloudError {
    tracing::debug!(reason, "developer auth denied");
    CloudError::permission_denied()
}
