//! Sandboxed execution of stored function code.
//!
//! Stored code runs inside an embedded rhai interpreter behind the
//! [`ScriptEvaluator`] trait, so the rest of the lifecycle stays testable
//! without a real interpreter. Each run gets a fresh scope exposing three
//! injected names: `ezcloud` (the operation facade plus request
//! accessors), `context` (the raw host capability object) and `crypto`
//! (jwt/md5 helpers).
//!
//! Scripts end a request early by calling `ezcloud.success(..)` or
//! `ezcloud.fail(..)`; built-in facade calls that fail downstream record
//! an internal-error signal. Signals are recorded in a session-local cell
//! and the script is halted with a marker error; the runner consults the
//! cell only when evaluation actually ended with that marker, so a signal
//! swallowed by a script-level `catch` cannot leak into a later,
//! unrelated termination.

use crate::context::RequestContext;
use crate::crypto::CryptoSuite;
use crate::host::{GqlPermission, HostCapabilities, HostTransport};
use ezcloud_core::{CloudError, CloudResult, Envelope, Signal};
use ezcloud_sdk::{
    AggregateInput, Facade, FindInput, MutationGetFirstOneInput, MutationInput, OperateInput,
    QueryInput, RunGqlInput,
};
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, EvalAltResult, NativeCallContext, Position, Scope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Source lines the evaluator prepends before stored code. Scripts are
/// evaluated unwrapped, so reported line numbers already match the stored
/// source text and the rebase is zero.
pub const WRAPPER_LINE_OFFSET: usize = 0;

/// Marker carried by the error that halts a script after a signal was
/// recorded. Never surfaced to callers.
const HALT_MARKER: &str = "__ezcloud_halt__";

/// Registered host/facade function names; these are sandbox-boundary
/// frames and are dropped from reported stacks.
const API_FN_NAMES: &[&str] = &[
    "success",
    "fail",
    "clog",
    "query",
    "mutation",
    "find",
    "aggregate",
    "queryGetFirstOne",
    "mutationGetFirstOne",
    "operate",
    "runGql",
    "callScf",
    "callActionflow",
    "callThirdapi",
    "uploadMedia",
    "genJwtToken",
    "parseJwtToken",
    "md5",
    "getRequest",
    "getSystem",
    "getScf",
    "getResponse",
    "getPayload",
    "getClientinfo",
    "getCallbackBody",
    "getCallbackInput",
    "getArg",
    "setReturn",
    "callThirdPartyApi",
    "callActionFlow",
];

/// What one sandboxed run can reach: the host, the request record and the
/// crypto helpers. Shared by reference with the lifecycle controller.
#[derive(Clone)]
pub struct SandboxSession {
    pub host: Rc<dyn HostCapabilities>,
    pub ctx: Rc<RefCell<RequestContext>>,
    pub crypto: CryptoSuite,
}

impl SandboxSession {
    pub fn new(
        host: Rc<dyn HostCapabilities>,
        ctx: Rc<RefCell<RequestContext>>,
        crypto: CryptoSuite,
    ) -> Self {
        Self { host, ctx, crypto }
    }

    /// A facade bound to the host's GraphQL capability.
    pub fn facade(&self) -> Facade<HostTransport> {
        Facade::new(HostTransport::new(Rc::clone(&self.host)))
    }
}

/// Pluggable script evaluation capability.
pub trait ScriptEvaluator {
    /// Runs `code` against the session and classifies its termination
    /// into a response envelope. Never panics, never raises.
    fn run(&self, code: &str, session: &SandboxSession) -> Envelope;
}

/// Evaluator limits.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Interpreter operation limit per run; 0 disables it.
    pub max_operations: u64,
    /// Maximum nested call levels.
    pub max_call_levels: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_operations: 5_000_000,
            max_call_levels: 64,
        }
    }
}

/// The production evaluator, on the embedded rhai interpreter.
#[derive(Debug, Default)]
pub struct RhaiEvaluator {
    config: EvaluatorConfig,
}

impl RhaiEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }
}

impl ScriptEvaluator for RhaiEvaluator {
    fn run(&self, code: &str, session: &SandboxSession) -> Envelope {
        let signal: Rc<RefCell<Option<Signal>>> = Rc::new(RefCell::new(None));
        let engine = build_engine(&self.config);

        let mut scope = Scope::new();
        scope.push(
            "ezcloud",
            CloudApi {
                session: session.clone(),
                signal: Rc::clone(&signal),
            },
        );
        scope.push(
            "context",
            HostApi {
                session: session.clone(),
            },
        );
        scope.push(
            "crypto",
            CryptoApi {
                crypto: session.crypto.clone(),
            },
        );

        let result = engine.eval_with_scope::<Dynamic>(&mut scope, code);
        let outcome = signal.borrow_mut().take();
        classify(result, outcome)
    }
}

/// The `ezcloud` object scripts see.
#[derive(Clone)]
struct CloudApi {
    session: SandboxSession,
    signal: Rc<RefCell<Option<Signal>>>,
}

/// The raw host capability object scripts see.
#[derive(Clone)]
struct HostApi {
    session: SandboxSession,
}

/// The crypto helper namespace scripts see.
#[derive(Clone)]
struct CryptoApi {
    crypto: CryptoSuite,
}

fn build_engine(config: &EvaluatorConfig) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(0, 0);
    engine.set_max_call_levels(config.max_call_levels);
    if config.max_operations > 0 {
        engine.set_max_operations(config.max_operations);
    }
    engine.on_print(|message| {
        tracing::info!(%message, "sandbox print");
    });

    engine.register_type_with_name::<CloudApi>("CloudApi");
    engine.register_type_with_name::<HostApi>("HostApi");
    engine.register_type_with_name::<CryptoApi>("CryptoApi");

    register_accessors(&mut engine);
    register_signals(&mut engine);
    register_facade(&mut engine);
    register_capabilities(&mut engine);
    register_crypto(&mut engine);

    engine
}

fn register_accessors(engine: &mut Engine) {
    engine.register_fn("getRequest", |api: &mut CloudApi| -> Dynamic {
        serialized(&api.session.ctx.borrow().request)
    });
    engine.register_fn("getSystem", |api: &mut CloudApi| -> Dynamic {
        serialized(&api.session.ctx.borrow().system)
    });
    engine.register_fn("getScf", |api: &mut CloudApi| -> Dynamic {
        serialized(&api.session.ctx.borrow().scf)
    });
    engine.register_fn("getResponse", |api: &mut CloudApi| -> Dynamic {
        serialized(&api.session.ctx.borrow().response)
    });
    engine.register_fn("getPayload", |api: &mut CloudApi| -> Dynamic {
        value_to_dynamic(&api.session.ctx.borrow().request.payload)
    });
    engine.register_fn("getClientinfo", |api: &mut CloudApi| -> Dynamic {
        value_to_dynamic(&api.session.ctx.borrow().request.clientinfo)
    });
    engine.register_fn("getCallbackBody", |api: &mut CloudApi| -> Dynamic {
        value_to_dynamic(&api.session.ctx.borrow().request.callback_body)
    });
    engine.register_fn("getCallbackInput", |api: &mut CloudApi| -> Dynamic {
        value_to_dynamic(&api.session.ctx.borrow().request.callback_input)
    });
    engine.register_fn(
        "clog",
        |call: NativeCallContext, api: &mut CloudApi, data: Dynamic| {
            let entry = json!({
                "data": dynamic_to_value(&data),
                "at": position_json(call.position()),
            });
            api.session.ctx.borrow_mut().record_clog(entry);
        },
    );
}

fn register_signals(engine: &mut Engine) {
    engine.register_fn(
        "success",
        |call: NativeCallContext, api: &mut CloudApi| -> Result<Dynamic, Box<EvalAltResult>> {
            finish_success(api, Value::Null, "success", call.position())
        },
    );
    engine.register_fn(
        "success",
        |call: NativeCallContext,
         api: &mut CloudApi,
         data: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            finish_success(api, dynamic_to_value(&data), "success", call.position())
        },
    );
    engine.register_fn(
        "success",
        |call: NativeCallContext,
         api: &mut CloudApi,
         data: Dynamic,
         msg: &str|
         -> Result<Dynamic, Box<EvalAltResult>> {
            finish_success(api, dynamic_to_value(&data), msg, call.position())
        },
    );

    engine.register_fn(
        "fail",
        |call: NativeCallContext, api: &mut CloudApi| -> Result<Dynamic, Box<EvalAltResult>> {
            finish_fail(api, Value::Null, "fail", -1, call.position())
        },
    );
    engine.register_fn(
        "fail",
        |call: NativeCallContext,
         api: &mut CloudApi,
         data: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            finish_fail(api, dynamic_to_value(&data), "fail", -1, call.position())
        },
    );
    engine.register_fn(
        "fail",
        |call: NativeCallContext,
         api: &mut CloudApi,
         data: Dynamic,
         msg: &str|
         -> Result<Dynamic, Box<EvalAltResult>> {
            finish_fail(api, dynamic_to_value(&data), msg, -1, call.position())
        },
    );
    engine.register_fn(
        "fail",
        |call: NativeCallContext,
         api: &mut CloudApi,
         data: Dynamic,
         msg: &str,
         code: i64|
         -> Result<Dynamic, Box<EvalAltResult>> {
            finish_fail(api, dynamic_to_value(&data), msg, code, call.position())
        },
    );
}

fn register_facade(engine: &mut Engine) {
    engine.register_fn(
        "query",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: QueryInput = parse_input(&input, call.position())?;
            let result = api.session.facade().query(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "mutation",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: MutationInput = parse_input(&input, call.position())?;
            let result = api.session.facade().mutation(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "find",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: FindInput = parse_input(&input, call.position())?;
            let result = api.session.facade().find(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "aggregate",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: AggregateInput = parse_input(&input, call.position())?;
            let result = api.session.facade().aggregate(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "queryGetFirstOne",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: QueryInput = parse_input(&input, call.position())?;
            let result = api.session.facade().query_get_first_one(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "mutationGetFirstOne",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: MutationGetFirstOneInput = parse_input(&input, call.position())?;
            let result = api.session.facade().mutation_get_first_one(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "operate",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: OperateInput = parse_input(&input, call.position())?;
            let result = api.session.facade().operate(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "runGql",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input: RunGqlInput = parse_input(&input, call.position())?;
            let result = api.session.facade().run_gql(input);
            facade_result(api, result, call.position())
        },
    );
    engine.register_fn(
        "callScf",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input = dynamic_to_value(&input);
            let (af_id, clientinfo) = {
                let ctx = api.session.ctx.borrow();
                (ctx.system.af_id.clone(), ctx.request.clientinfo.clone())
            };
            let args = json!({
                "scf_dir": input.get("scf_dir").cloned().unwrap_or(Value::Null),
                "scf_name": input.get("scf_name").cloned().unwrap_or(Value::Null),
                "payload": input.get("payload").cloned().unwrap_or(json!({})),
                "clientinfo": clientinfo,
            });
            match api.session.host.call_action_flow(&af_id, None, &args) {
                Ok(raw) => {
                    let envelope = Envelope::from_value(raw);
                    if envelope.is_ok() {
                        Ok(value_to_dynamic(&envelope.data))
                    } else {
                        internal_halt(
                            api,
                            CloudError::framework(envelope.msg.clone())
                                .with_info(json!({ "code": envelope.code, "data": envelope.data })),
                            call.position(),
                        )
                    }
                }
                Err(err) => internal_halt(api, err, call.position()),
            }
        },
    );
    engine.register_fn(
        "callActionflow",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input = dynamic_to_value(&input);
            let flow_id = input
                .get("actionFlowId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let version = input.get("versionId").and_then(Value::as_i64);
            let args = input.get("args").cloned().unwrap_or(json!({}));
            match api.session.host.call_action_flow(&flow_id, version, &args) {
                Ok(raw) => Ok(value_to_dynamic(&raw)),
                Err(err) => internal_halt(api, err, call.position()),
            }
        },
    );
    engine.register_fn(
        "callThirdapi",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input = dynamic_to_value(&input);
            let operation_id = input
                .get("operation_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| api.session.ctx.borrow().system.thirdapi_id.clone());
            let args = input
                .get("args")
                .or_else(|| input.get("data"))
                .cloned()
                .unwrap_or(json!({}));
            match api.session.host.call_third_party_api(&operation_id, &args) {
                Ok(raw) => Ok(value_to_dynamic(&raw)),
                Err(err) => internal_halt(api, err, call.position()),
            }
        },
    );
    engine.register_fn(
        "uploadMedia",
        |call: NativeCallContext,
         api: &mut CloudApi,
         input: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let input = dynamic_to_value(&input);
            let url = input
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let headers = input.get("headers").cloned().unwrap_or(Value::Null);
            match api.session.host.upload_media(&url, &headers) {
                Ok(raw) => Ok(value_to_dynamic(&raw)),
                Err(err) => internal_halt(api, err, call.position()),
            }
        },
    );

    engine.register_fn(
        "genJwtToken",
        |call: NativeCallContext,
         api: &mut CloudApi,
         data: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let claims = dynamic_to_value(&data);
            api.session
                .crypto
                .gen_jwt(&claims)
                .map(Dynamic::from)
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn(
        "parseJwtToken",
        |call: NativeCallContext,
         api: &mut CloudApi,
         token: &str|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.session
                .crypto
                .parse_jwt(token)
                .map(|claims| value_to_dynamic(&claims))
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn("md5", |_api: &mut CloudApi, input: &str| -> Dynamic {
        Dynamic::from(CryptoSuite::md5_hex(input))
    });
}

fn register_capabilities(engine: &mut Engine) {
    engine.register_fn(
        "getArg",
        |call: NativeCallContext,
         api: &mut HostApi,
         name: &str|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.session
                .host
                .get_arg(name)
                .map(|v| value_to_dynamic(&v))
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn(
        "setReturn",
        |call: NativeCallContext,
         api: &mut HostApi,
         name: &str,
         value: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.session
                .host
                .set_return(name, &dynamic_to_value(&value))
                .map(|_| Dynamic::UNIT)
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn(
        "runGql",
        |call: NativeCallContext,
         api: &mut HostApi,
         document: &str,
         variables: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.session
                .host
                .run_gql(
                    None,
                    document,
                    &dynamic_to_value(&variables),
                    &GqlPermission::default(),
                )
                .map(|v| value_to_dynamic(&v))
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn(
        "callThirdPartyApi",
        |call: NativeCallContext,
         api: &mut HostApi,
         operation_id: &str,
         args: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.session
                .host
                .call_third_party_api(operation_id, &dynamic_to_value(&args))
                .map(|v| value_to_dynamic(&v))
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn(
        "callActionFlow",
        |call: NativeCallContext,
         api: &mut HostApi,
         flow_id: &str,
         version: Dynamic,
         args: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            let version = version.as_int().ok();
            api.session
                .host
                .call_action_flow(flow_id, version, &dynamic_to_value(&args))
                .map(|v| value_to_dynamic(&v))
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn(
        "uploadMedia",
        |call: NativeCallContext,
         api: &mut HostApi,
         url: &str,
         headers: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.session
                .host
                .upload_media(url, &dynamic_to_value(&headers))
                .map(|v| value_to_dynamic(&v))
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
}

fn register_crypto(engine: &mut Engine) {
    engine.register_fn("md5", |_api: &mut CryptoApi, input: &str| -> Dynamic {
        Dynamic::from(CryptoSuite::md5_hex(input))
    });
    engine.register_fn(
        "genJwtToken",
        |call: NativeCallContext,
         api: &mut CryptoApi,
         data: Dynamic|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.crypto
                .gen_jwt(&dynamic_to_value(&data))
                .map(Dynamic::from)
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
    engine.register_fn(
        "parseJwtToken",
        |call: NativeCallContext,
         api: &mut CryptoApi,
         token: &str|
         -> Result<Dynamic, Box<EvalAltResult>> {
            api.crypto
                .parse_jwt(token)
                .map(|claims| value_to_dynamic(&claims))
                .map_err(|e| script_error(e.message, call.position()))
        },
    );
}

fn finish_success(
    api: &CloudApi,
    data: Value,
    msg: &str,
    pos: Position,
) -> Result<Dynamic, Box<EvalAltResult>> {
    *api.signal.borrow_mut() = Some(Signal::Success(Envelope {
        code: 0,
        msg: msg.to_string(),
        data,
    }));
    Err(halt_error(pos))
}

fn finish_fail(
    api: &CloudApi,
    data: Value,
    msg: &str,
    code: i64,
    pos: Position,
) -> Result<Dynamic, Box<EvalAltResult>> {
    if code == 0 {
        return Err(script_error(
            "the `code` of `fail` must not be 0".to_string(),
            pos,
        ));
    }
    *api.signal.borrow_mut() = Some(Signal::Fail(Envelope {
        code,
        msg: msg.to_string(),
        data,
    }));
    Err(halt_error(pos))
}

/// Turns a facade result into script output, recording an internal-error
/// signal and halting when the downstream call failed.
fn facade_result<T: Serialize>(
    api: &CloudApi,
    result: CloudResult<T>,
    pos: Position,
) -> Result<Dynamic, Box<EvalAltResult>> {
    match result {
        Ok(out) => {
            let value = serde_json::to_value(out).unwrap_or(Value::Null);
            Ok(value_to_dynamic(&value))
        }
        Err(err) => internal_halt(api, err, pos),
    }
}

fn internal_halt(
    api: &CloudApi,
    err: CloudError,
    pos: Position,
) -> Result<Dynamic, Box<EvalAltResult>> {
    let mut info = match err.info.clone() {
        Some(Value::Object(map)) => Value::Object(map),
        Some(other) => json!({ "detail": other }),
        None => json!({}),
    };
    if let Some(map) = info.as_object_mut() {
        map.insert("message".to_string(), Value::String(err.message.clone()));
        map.insert(
            "code".to_string(),
            Value::String(err.code.as_str().to_string()),
        );
    }
    *api.signal.borrow_mut() = Some(Signal::internal(err.message, info));
    Err(halt_error(pos))
}

fn halt_error(pos: Position) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(HALT_MARKER.into(), pos))
}

fn script_error(message: String, pos: Position) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(message.into(), pos))
}

fn parse_input<T: DeserializeOwned>(
    input: &Dynamic,
    pos: Position,
) -> Result<T, Box<EvalAltResult>> {
    let value = dynamic_to_value(input);
    serde_json::from_value(value).map_err(|e| script_error(format!("invalid input: {e}"), pos))
}

/// Classifies how a run terminated into the response envelope.
fn classify(result: Result<Dynamic, Box<EvalAltResult>>, signal: Option<Signal>) -> Envelope {
    match result {
        Ok(value) => Envelope::ok(dynamic_to_value(&value)),
        Err(err) => {
            if is_halt(&err) {
                match signal {
                    Some(Signal::Success(envelope)) => envelope,
                    Some(Signal::Fail(mut envelope)) => {
                        if let Some(map) = envelope.data.as_object_mut() {
                            map.insert("_stack".to_string(), Value::String(stack_text(&err)));
                        }
                        envelope
                    }
                    Some(Signal::Internal { message, info }) => {
                        let mut info = info;
                        if let Some(map) = info.as_object_mut() {
                            map.insert("_stack".to_string(), Value::String(stack_text(&err)));
                        }
                        Envelope::fail(-2, message, json!({ "info": info }))
                    }
                    None => user_error(&err),
                }
            } else {
                user_error(&err)
            }
        }
    }
}

fn user_error(err: &EvalAltResult) -> Envelope {
    let message = match innermost(err) {
        EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
        other => other.to_string(),
    };
    Envelope::fail(
        -1,
        message.clone(),
        json!({ "info": { "message": message, "_stack": stack_text(err) } }),
    )
}

fn is_halt(err: &EvalAltResult) -> bool {
    matches!(innermost(err), EvalAltResult::ErrorRuntime(value, _) if value.to_string() == HALT_MARKER)
}

/// Unwraps interpreter call-frame wrappers to the innermost error.
fn innermost(err: &EvalAltResult) -> &EvalAltResult {
    err.unwrap_inner()
}

/// Builds a cleaned stack trace: script frames outermost-first, boundary
/// frames (registered host functions) dropped, positions rebased by
/// [`WRAPPER_LINE_OFFSET`].
fn stack_text(err: &EvalAltResult) -> String {
    let mut frames = Vec::new();
    let mut current = err;
    while let EvalAltResult::ErrorInFunctionCall(name, _, inner, pos) = current {
        if !API_FN_NAMES.contains(&name.as_str()) {
            frames.push(format!("in call to `{name}` ({})", describe_position(*pos)));
        }
        current = inner;
    }
    frames.push(format!("at {}", describe_position(current.position())));
    frames.join("\n")
}

fn describe_position(pos: Position) -> String {
    match pos.line() {
        Some(line) => format!(
            "line {}, position {}",
            line - WRAPPER_LINE_OFFSET,
            pos.position().unwrap_or(0)
        ),
        None => "unknown position".to_string(),
    }
}

fn position_json(pos: Position) -> Value {
    json!({ "line": pos.line(), "position": pos.position() })
}

fn dynamic_to_value(value: &Dynamic) -> Value {
    from_dynamic(value).unwrap_or(Value::Null)
}

fn value_to_dynamic(value: &Value) -> Dynamic {
    to_dynamic(value).unwrap_or(Dynamic::UNIT)
}

fn serialized<T: Serialize>(value: &T) -> Dynamic {
    let value = serde_json::to_value(value).unwrap_or(Value::Null);
    value_to_dynamic(&value)
}
