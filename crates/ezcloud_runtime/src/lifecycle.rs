//! The request lifecycle state machine.
//!
//! One controller drives one inbound invocation through a strictly
//! ordered sequence of states, each conditioned on the response still
//! being on its success path. Parameter reads, configuration resolution
//! and audit logging recover locally into the error side-channel and
//! never abort the request; sandbox and dispatch failures become the
//! terminal response. Exactly one envelope is handed back to the host.

use crate::auth;
use crate::builtin::{self, Builtin};
use crate::context::{RequestContext, ScfRecord, SystemConfig, ROOT_SCF_DIR};
use crate::crypto::CryptoSuite;
use crate::host::{HostCapabilities, HostTransport};
use crate::sandbox::{RhaiEvaluator, SandboxSession, ScriptEvaluator};
use ezcloud_core::Envelope;
use ezcloud_gql::{ArgMap, ArgValue};
use ezcloud_sdk::{Facade, MutationInput, QueryInput};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Lifecycle states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    ParamsRead,
    SystemResolved,
    FunctionResolved,
    RequestLogged,
    PreHookRun,
    BodyRun,
    PostHookRun,
    ResponseFinalized,
}

const SYSTEM_COLUMNS: &str =
    "id idx name is_logs is_developer_auth pre_hook_code post_hook_code global_config thirdapi_id af_id";
const SCF_COLUMNS: &str = "id scf_dir scf_name description scf_code parameters returns";

/// The lifecycle controller for one inbound invocation.
///
/// A controller instance runs its entry transition exactly once; calling
/// [`Lifecycle::start`] again is a no-op returning the already-assembled
/// response.
pub struct Lifecycle {
    host: Rc<dyn HostCapabilities>,
    evaluator: Box<dyn ScriptEvaluator>,
    ctx: Rc<RefCell<RequestContext>>,
    state: LifecycleState,
    log_id: Option<Value>,
}

impl Lifecycle {
    /// A controller with the production script evaluator.
    pub fn new(host: Rc<dyn HostCapabilities>) -> Self {
        Self::with_evaluator(host, Box::new(RhaiEvaluator::default()))
    }

    /// A controller with an injected script evaluator.
    pub fn with_evaluator(host: Rc<dyn HostCapabilities>, evaluator: Box<dyn ScriptEvaluator>) -> Self {
        Self {
            host,
            evaluator,
            ctx: Rc::new(RefCell::new(RequestContext::new())),
            state: LifecycleState::Idle,
            log_id: None,
        }
    }

    /// The request record (shared with sandboxed code).
    pub fn context(&self) -> Rc<RefCell<RequestContext>> {
        Rc::clone(&self.ctx)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Drives the whole lifecycle and returns the terminal response.
    pub fn start(&mut self) -> Envelope {
        if self.state != LifecycleState::Idle {
            return self.ctx.borrow().response.clone();
        }
        let span = tracing::debug_span!("lifecycle");
        let _guard = span.enter();

        self.read_params();
        self.resolve_system();

        let crypto = CryptoSuite::from_system(&self.ctx.borrow().system);
        let session = SandboxSession::new(Rc::clone(&self.host), Rc::clone(&self.ctx), crypto);

        self.resolve_function(&session);
        self.log_request(&session);
        self.run_hook(&session, Hook::Pre);
        self.run_body(&session);
        self.run_hook(&session, Hook::Post);
        self.finalize(&session)
    }

    /// Pulls the request tuple from the host. Per-field failures are
    /// recorded, never fatal.
    fn read_params(&mut self) {
        let mut ctx = self.ctx.borrow_mut();
        for name in [
            "scf_name",
            "scf_dir",
            "payload",
            "clientinfo",
            "callback_body",
            "callback_input",
        ] {
            match self.host.get_arg(name) {
                Ok(value) => assign_param(&mut ctx, name, value),
                Err(err) => ctx.record_error("get_arg", format!("{name}: {}", err.message)),
            }
        }
        drop(ctx);
        self.state = LifecycleState::ParamsRead;
        tracing::debug!(state = ?self.state, "params read");
    }

    /// Resolves the newest system configuration row. Failure leaves the
    /// zero-value defaults in place.
    fn resolve_system(&mut self) {
        let facade = Facade::new(HostTransport::new(Rc::clone(&self.host)));

        let mut order_by = ArgMap::new();
        order_by.insert("idx".to_string(), ArgValue::raw("desc_nulls_last"));
        let mut args = ArgMap::new();
        args.insert("order_by".to_string(), ArgValue::Object(order_by));
        args.insert("limit".to_string(), 1i64.into());

        let result = facade.query(QueryInput {
            name: "ez_system".to_string(),
            args,
            fields: Some(SYSTEM_COLUMNS.into()),
            ..QueryInput::default()
        });

        let mut ctx = self.ctx.borrow_mut();
        match result {
            Ok(rows) => {
                if let Some(row) = rows.into_iter().next() {
                    match serde_json::from_value::<SystemConfig>(row) {
                        Ok(system) => ctx.system = system,
                        Err(err) => ctx.record_error("system", err.to_string()),
                    }
                }
            }
            Err(err) => ctx.record_error("system", err.message),
        }
        drop(ctx);
        self.state = LifecycleState::SystemResolved;
        tracing::debug!(state = ?self.state, "system resolved");
    }

    /// Binds a built-in, or looks the function up by exact
    /// `(scf_name, scf_dir)`. A miss yields the soft `-1` response.
    fn resolve_function(&mut self, session: &SandboxSession) {
        let (name, dir) = {
            let ctx = self.ctx.borrow();
            (ctx.request.scf_name.clone(), ctx.request.scf_dir.clone())
        };

        if dir == ROOT_SCF_DIR {
            if let Some(b) = Builtin::from_name(&name) {
                self.ctx.borrow_mut().scf = builtin::bind_record(b, &name, &dir);
                self.state = LifecycleState::FunctionResolved;
                tracing::debug!(builtin = b.name(), "function resolved");
                return;
            }
        }

        let mut name_eq = ArgMap::new();
        name_eq.insert("_eq".to_string(), name.clone().into());
        let mut dir_eq = ArgMap::new();
        dir_eq.insert("_eq".to_string(), dir.clone().into());
        let mut clauses = ArgMap::new();
        clauses.insert("scf_name".to_string(), ArgValue::Object(name_eq));
        clauses.insert("scf_dir".to_string(), ArgValue::Object(dir_eq));
        let mut args = ArgMap::new();
        args.insert("where".to_string(), ArgValue::Object(clauses));
        args.insert("limit".to_string(), 1i64.into());

        let result = session.facade().query(QueryInput {
            name: "ez_scf".to_string(),
            args,
            fields: Some(SCF_COLUMNS.into()),
            ..QueryInput::default()
        });

        let mut ctx = self.ctx.borrow_mut();
        let resolved = match result {
            Ok(rows) => rows
                .into_iter()
                .next()
                .and_then(|row| match serde_json::from_value::<ScfRecord>(row) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        ctx.record_error("scf", err.to_string());
                        None
                    }
                }),
            Err(err) => {
                ctx.record_error("scf", err.message);
                None
            }
        };
        match resolved {
            Some(record) => ctx.scf = record,
            None => {
                ctx.response = Envelope::fail(-1, format!("{dir}/{name} not found"), Value::Null);
            }
        }
        drop(ctx);
        self.state = LifecycleState::FunctionResolved;
        tracing::debug!(state = ?self.state, "function resolved");
    }

    /// Inserts the inbound audit row when logging is enabled. Insertion
    /// failure is recorded and does not block execution.
    fn log_request(&mut self, session: &SandboxSession) {
        let (enabled, request) = {
            let ctx = self.ctx.borrow();
            (
                ctx.system.is_logs && ctx.response.is_ok(),
                ctx.request.clone(),
            )
        };
        if enabled {
            let mut object = ArgMap::new();
            object.insert("scf_name".to_string(), request.scf_name.clone().into());
            object.insert("scf_dir".to_string(), request.scf_dir.clone().into());
            object.insert("payload".to_string(), ArgValue::var("payload"));
            object.insert("clientinfo".to_string(), ArgValue::var("clientinfo"));
            let mut args = ArgMap::new();
            args.insert("object".to_string(), ArgValue::Object(object));

            let mut input = MutationInput {
                name: "insert_ez_logs_one".to_string(),
                args,
                fields: Some("id".into()),
                ..MutationInput::default()
            };
            input.op_args.insert("$payload".to_string(), "jsonb".to_string());
            input
                .op_args
                .insert("$clientinfo".to_string(), "jsonb".to_string());
            input.variables.insert("payload".to_string(), request.payload);
            input
                .variables
                .insert("clientinfo".to_string(), request.clientinfo);

            match session.facade().mutation(input) {
                Ok(row) => self.log_id = row.get("id").cloned().filter(|id| !id.is_null()),
                Err(err) => self.ctx.borrow_mut().record_error("logs", err.message),
            }
        }
        self.state = LifecycleState::RequestLogged;
        tracing::debug!(state = ?self.state, logged = self.log_id.is_some(), "request logged");
    }

    fn run_hook(&mut self, session: &SandboxSession, hook: Hook) {
        let (code, runnable) = {
            let ctx = self.ctx.borrow();
            let code = match hook {
                Hook::Pre => ctx.system.pre_hook_code.clone(),
                Hook::Post => ctx.system.post_hook_code.clone(),
            };
            (code, ctx.response.is_ok())
        };
        if runnable && !code.is_empty() {
            let response = self.evaluator.run(&code, session);
            self.ctx.borrow_mut().response = response;
        }
        self.state = match hook {
            Hook::Pre => LifecycleState::PreHookRun,
            Hook::Post => LifecycleState::PostHookRun,
        };
        tracing::debug!(state = ?self.state, "hook finished");
    }

    /// Runs the resolved function: built-ins dispatch directly behind the
    /// permission gate, stored code runs through the sandbox.
    fn run_body(&mut self, session: &SandboxSession) {
        let (scf, runnable) = {
            let ctx = self.ctx.borrow();
            (ctx.scf.clone(), ctx.response.is_ok())
        };
        if runnable {
            if let Some(b) = scf.scf_fn {
                let response = match auth::authorize(session, b) {
                    Ok(()) => match builtin::execute(b, session, self.evaluator.as_ref()) {
                        Ok(envelope) => envelope,
                        Err(err) => err.to_envelope(),
                    },
                    Err(err) => err.to_envelope(),
                };
                self.ctx.borrow_mut().response = response;
            } else if !scf.scf_code.is_empty() {
                let response = self.evaluator.run(&scf.scf_code, session);
                self.ctx.borrow_mut().response = response;
            }
        }
        self.state = LifecycleState::BodyRun;
        tracing::debug!(state = ?self.state, "body finished");
    }

    /// Merges diagnostics into the response, hands it to the host and
    /// attempts the final audit update. Best-effort throughout.
    fn finalize(&mut self, session: &SandboxSession) -> Envelope {
        let response = {
            let mut ctx = self.ctx.borrow_mut();
            let errors = ctx.errors.clone();
            let clogs = ctx.clogs.clone();
            ctx.response.attach_diagnostics(&errors, &clogs);
            ctx.response.clone()
        };

        for (key, value) in [
            ("code", json!(response.code)),
            ("msg", json!(response.msg)),
            ("data", response.data.clone()),
        ] {
            if let Err(err) = self.host.set_return(key, &value) {
                self.ctx
                    .borrow_mut()
                    .record_error("set_return", format!("{key}: {}", err.message));
            }
        }

        self.update_log(session, &response);

        self.state = LifecycleState::ResponseFinalized;
        tracing::debug!(code = response.code, "response finalized");
        response
    }

    fn update_log(&mut self, session: &SandboxSession, response: &Envelope) {
        let enabled = self.ctx.borrow().system.is_logs;
        let Some(log_id) = self.log_id.clone() else {
            return;
        };
        if !enabled {
            return;
        }

        let mut pk = ArgMap::new();
        pk.insert("id".to_string(), ArgValue::from(log_id));
        let mut set = ArgMap::new();
        set.insert("code".to_string(), response.code.into());
        set.insert("msg".to_string(), response.msg.clone().into());
        set.insert("data".to_string(), ArgValue::var("data"));
        set.insert("errors".to_string(), ArgValue::var("errors"));
        set.insert("clogs".to_string(), ArgValue::var("clogs"));
        let mut args = ArgMap::new();
        args.insert("pk_columns".to_string(), ArgValue::Object(pk));
        args.insert("_set".to_string(), ArgValue::Object(set));

        let mut input = MutationInput {
            name: "update_ez_logs_by_pk".to_string(),
            args,
            fields: Some("id".into()),
            ..MutationInput::default()
        };
        for name in ["$data", "$errors", "$clogs"] {
            input.op_args.insert(name.to_string(), "jsonb".to_string());
        }
        let (errors, clogs) = {
            let ctx = self.ctx.borrow();
            (ctx.errors.clone(), ctx.clogs.clone())
        };
        input
            .variables
            .insert("data".to_string(), response.data.clone());
        input.variables.insert("errors".to_string(), json!(errors));
        input.variables.insert("clogs".to_string(), json!(clogs));

        if let Err(err) = session.facade().mutation(input) {
            self.ctx.borrow_mut().record_error("logs", err.message);
        }
    }
}

#[derive(Clone, Copy)]
enum Hook {
    Pre,
    Post,
}

fn assign_param(ctx: &mut RequestContext, name: &str, value: Value) {
    match name {
        "scf_name" => {
            if let Some(text) = value.as_str() {
                ctx.request.scf_name = text.to_string();
            }
        }
        "scf_dir" => {
            if let Some(text) = value.as_str() {
                if !text.is_empty() {
                    ctx.request.scf_dir = text.to_string();
                }
            }
        }
        "payload" => {
            if !value.is_null() {
                ctx.request.payload = value;
            }
        }
        "clientinfo" => {
            if !value.is_null() {
                ctx.request.clientinfo = value;
            }
        }
        "callback_body" => ctx.request.callback_body = value,
        "callback_input" => ctx.request.callback_input = value,
        _ => {}
    }
}
