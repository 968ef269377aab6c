//! The operation facade.
//!
//! Each entry point wraps one field under a fixed alias (`response`, or
//! `datas`/`datas_aggregate` for `find`), composes the document, runs it
//! through the injected transport and projects the aliased sub-tree back
//! out of the result.

use crate::inputs::{
    AggregateInput, FindInput, MutationGetFirstOneInput, MutationInput, OperateInput, QueryInput,
    RunGqlInput,
};
use crate::transport::{unwrap_response, GqlTransport};
use ezcloud_core::{CloudError, CloudResult};
use ezcloud_gql::{ArgValue, FieldNode, Fields, GqlDocument, Operation, OperationKind};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Default page size for `find`.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Result of a raw `operate` call.
#[derive(Debug, Clone, Serialize)]
pub struct OperateResult {
    pub document: String,
    pub variables: Value,
    pub response: Value,
}

/// Result of a `find` call.
#[derive(Debug, Clone, Serialize)]
pub struct FindResult {
    pub datas: Vec<Value>,
    pub aggregate: Value,
}

/// The operation facade over a [`GqlTransport`].
#[derive(Debug, Clone)]
pub struct Facade<T> {
    transport: T,
}

impl<T: GqlTransport> Facade<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Composes and executes an operation, returning the unwrapped data.
    fn execute(&self, op: &Operation) -> CloudResult<(GqlDocument, Value)> {
        let doc = op.compose()?;
        tracing::debug!(document = %doc.document, "issuing graphql operation");
        let variables = variables_to_value(&doc.variables);
        let raw = self.transport.run_gql(&doc.document, &variables)?;
        let data = unwrap_response(raw, &doc.document)?;
        Ok((doc, data))
    }

    /// Raw operation execution; returns the document, its variables and
    /// the unprojected response.
    pub fn operate(&self, input: OperateInput) -> CloudResult<OperateResult> {
        let op = Operation {
            kind: input.op_method,
            name: input.op_name,
            args: input.op_args,
            fields: input.op_fields,
            variables: input.variables,
        };
        let (doc, data) = self.execute(&op)?;
        Ok(OperateResult {
            document: doc.document,
            variables: variables_to_value(&doc.variables),
            response: data,
        })
    }

    /// Queries one collection, aliased `response`; returns its rows.
    pub fn query(&self, input: QueryInput) -> CloudResult<Vec<Value>> {
        let node = FieldNode {
            alias: Some("response".to_string()),
            name: input.name,
            args: input.args,
            directives: input.directives,
            fields: input.fields,
        };
        let op = Operation {
            kind: OperationKind::Query,
            name: input.op_name,
            args: input.op_args,
            fields: Some(node.into()),
            variables: input.variables,
        };
        let (_, mut data) = self.execute(&op)?;
        rows_from(take_key(&mut data, "response"))
    }

    /// Runs one mutation field, aliased `response`; returns its sub-tree.
    pub fn mutation(&self, input: MutationInput) -> CloudResult<Value> {
        let node = FieldNode {
            alias: Some("response".to_string()),
            name: input.name,
            args: input.args,
            directives: input.directives,
            fields: input.fields,
        };
        let op = Operation {
            kind: OperationKind::Mutation,
            name: input.op_name,
            args: input.op_args,
            fields: Some(node.into()),
            variables: input.variables,
        };
        let (_, mut data) = self.execute(&op)?;
        Ok(take_key(&mut data, "response"))
    }

    /// A paged row selection (`datas`) plus an aggregate count over the
    /// same filter with pagination nulled out (`datas_aggregate`).
    pub fn find(&self, input: FindInput) -> CloudResult<FindResult> {
        let page_number = input.page_number.unwrap_or(1).max(1);
        let page_size = input.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = (page_number - 1) * page_size;

        let mut data_args = input.args.clone();
        data_args.insert("limit".to_string(), (page_size as i64).into());
        data_args.insert("offset".to_string(), (offset as i64).into());

        let mut agg_args = input.args;
        agg_args.insert("limit".to_string(), ArgValue::Null);
        agg_args.insert("offset".to_string(), ArgValue::Null);

        let datas_node = FieldNode {
            alias: Some("datas".to_string()),
            name: input.name.clone(),
            args: data_args,
            directives: input.directives,
            fields: input.fields,
        };
        let agg_node = FieldNode::new(format!("{}_aggregate", input.name))
            .alias("datas_aggregate")
            .args(agg_args)
            .fields(aggregate_selection(input.aggregate_fields));

        let op = Operation {
            kind: OperationKind::Query,
            name: input.op_name,
            args: input.op_args,
            fields: Some(vec![Fields::from(datas_node), agg_node.into()].into()),
            variables: input.variables,
        };
        let (_, mut data) = self.execute(&op)?;
        let mut aggregate_tree = take_key(&mut data, "datas_aggregate");
        Ok(FindResult {
            datas: rows_from(take_key(&mut data, "datas"))?,
            aggregate: take_key(&mut aggregate_tree, "aggregate"),
        })
    }

    /// An aggregate-only selection, projecting `response.aggregate`.
    pub fn aggregate(&self, input: AggregateInput) -> CloudResult<Value> {
        let node = FieldNode::new(format!("{}_aggregate", input.name))
            .alias("response")
            .args(input.args)
            .fields(aggregate_selection(input.aggregate_fields));
        let op = Operation {
            kind: OperationKind::Query,
            name: input.op_name,
            args: input.op_args,
            fields: Some(node.into()),
            variables: input.variables,
        };
        let (_, mut data) = self.execute(&op)?;
        let mut response = take_key(&mut data, "response");
        Ok(take_key(&mut response, "aggregate"))
    }

    /// Forces `limit: 1` and unwraps the first row. An empty result set
    /// is `None`, not an error.
    pub fn query_get_first_one(&self, mut input: QueryInput) -> CloudResult<Option<Value>> {
        input.args.insert("limit".to_string(), 1i64.into());
        let rows = self.query(input)?;
        Ok(rows.into_iter().next())
    }

    /// Selects `returning { … }` and unwraps `returning[0]`. An empty
    /// returning set is `None`, not an error.
    pub fn mutation_get_first_one(
        &self,
        input: MutationGetFirstOneInput,
    ) -> CloudResult<Option<Value>> {
        let returning = FieldNode::new("returning")
            .fields(input.returning_fields.unwrap_or_else(|| "id".into()));
        let mutation = MutationInput {
            name: input.name,
            args: input.args,
            directives: input.directives,
            fields: Some(returning.into()),
            op_name: input.op_name,
            op_args: input.op_args,
            variables: input.variables,
        };
        let mut response = self.mutation(mutation)?;
        match take_key(&mut response, "returning") {
            Value::Array(mut rows) => {
                if rows.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(rows.remove(0)))
                }
            }
            _ => Ok(None),
        }
    }

    /// Passes an already-composed document straight to the transport.
    pub fn run_gql(&self, input: RunGqlInput) -> CloudResult<Value> {
        let variables = variables_to_value(&input.variables);
        let raw = self.transport.run_gql(&input.document, &variables)?;
        unwrap_response(raw, &input.document)
    }
}

fn aggregate_selection(aggregate_fields: Option<Fields>) -> Fields {
    FieldNode::new("aggregate")
        .fields(aggregate_fields.unwrap_or_else(|| "count".into()))
        .into()
}

fn variables_to_value(variables: &IndexMap<String, Value>) -> Value {
    let map: Map<String, Value> = variables
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(map)
}

fn take_key(data: &mut Value, key: &str) -> Value {
    data.get_mut(key).map(Value::take).unwrap_or(Value::Null)
}

fn rows_from(value: Value) -> CloudResult<Vec<Value>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(rows) => Ok(rows),
        other => Err(CloudError::response(format!(
            "expected a row list, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezcloud_core::ErrorCode;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Transport double recording every issued document.
    #[derive(Default)]
    struct MockTransport {
        calls: RefCell<Vec<(String, Value)>>,
        responses: RefCell<VecDeque<Value>>,
    }

    impl MockTransport {
        fn respond_with(response: Value) -> Self {
            let transport = Self::default();
            transport.responses.borrow_mut().push_back(response);
            transport
        }

        fn last_document(&self) -> String {
            self.calls.borrow().last().map(|(d, _)| d.clone()).unwrap_or_default()
        }
    }

    impl GqlTransport for MockTransport {
        fn run_gql(&self, document: &str, variables: &Value) -> CloudResult<Value> {
            self.calls
                .borrow_mut()
                .push((document.to_string(), variables.clone()));
            Ok(self
                .responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| json!({ "data": {} })))
        }
    }

    fn query_input(value: Value) -> QueryInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_query_projects_response_alias() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "data": { "response": [{ "id": 1 }, { "id": 2 }] }
        })));
        let rows = facade
            .query(query_input(json!({ "name": "account", "fields": "id" })))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(
            facade.transport().last_document(),
            "query GenGql {\n  response: account {\n    id\n  }\n}"
        );
    }

    #[test]
    fn test_mutation_projects_response_alias() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "data": { "response": { "id": 7 } }
        })));
        let out = facade
            .mutation(query_input(json!({
                "name": "insert_account_one",
                "args": { "object": { "name": "bob" } },
                "fields": "id",
            })))
            .unwrap();
        assert_eq!(out["id"], json!(7));
        assert_eq!(
            facade.transport().last_document(),
            "mutation GenGql {\n  response: insert_account_one(object: {name: \"bob\"}) {\n    id\n  }\n}"
        );
    }

    #[test]
    fn test_find_pagination_and_aggregate_args() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "data": {
                "datas": [{ "id": 11 }],
                "datas_aggregate": { "aggregate": { "count": 31 } },
            }
        })));
        let input: FindInput = serde_json::from_value(json!({
            "name": "account",
            "page_number": 2,
            "page_size": 10,
            "fields": "id",
        }))
        .unwrap();
        let result = facade.find(input).unwrap();
        assert_eq!(result.datas.len(), 1);
        assert_eq!(result.aggregate["count"], json!(31));

        let document = facade.transport().last_document();
        assert!(document.contains("datas: account(limit: 10, offset: 10)"));
        assert!(document.contains("datas_aggregate: account_aggregate(limit: null, offset: null)"));
        assert!(document.contains("aggregate {\n      count\n    }"));
    }

    #[test]
    fn test_aggregate_projection() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "data": { "response": { "aggregate": { "count": 4 } } }
        })));
        let input: AggregateInput =
            serde_json::from_value(json!({ "name": "account" })).unwrap();
        let out = facade.aggregate(input).unwrap();
        assert_eq!(out["count"], json!(4));
        assert_eq!(
            facade.transport().last_document(),
            "query GenGql {\n  response: account_aggregate {\n    aggregate {\n      count\n    }\n  }\n}"
        );
    }

    #[test]
    fn test_query_get_first_one_empty_is_none() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "data": { "response": [] }
        })));
        let out = facade
            .query_get_first_one(query_input(json!({ "name": "account", "fields": "id" })))
            .unwrap();
        assert!(out.is_none());
        assert!(facade
            .transport()
            .last_document()
            .contains("response: account(limit: 1)"));
    }

    #[test]
    fn test_mutation_get_first_one_unwraps_returning() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "data": { "response": { "returning": [{ "id": 3 }] } }
        })));
        let input: MutationGetFirstOneInput = serde_json::from_value(json!({
            "name": "insert_account",
            "returning_fields": "id",
        }))
        .unwrap();
        let out = facade.mutation_get_first_one(input).unwrap();
        assert_eq!(out.unwrap()["id"], json!(3));
    }

    #[test]
    fn test_graphql_errors_surface_as_transport_failure() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "errors": [{ "message": "unknown field", "locations": [] }]
        })));
        let err = facade
            .query(query_input(json!({ "name": "nope" })))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Transport);
        assert_eq!(err.message, "unknown field");
    }

    #[test]
    fn test_variables_restricted_to_declared_args() {
        let facade = Facade::new(MockTransport::respond_with(json!({
            "data": { "response": { "id": 1 } }
        })));
        let input = query_input(json!({
            "name": "insert_ez_logs_one",
            "args": { "object": {} },
            "fields": "id",
            "opArgs": { "$payload": "jsonb" },
            "variables": { "payload": { "a": 1 }, "stray": true },
        }));
        facade.mutation(input).unwrap();
        let calls = facade.transport().calls.borrow();
        let (document, variables) = calls.last().unwrap();
        assert!(document.starts_with("mutation GenGql($payload: jsonb) {"));
        assert_eq!(variables, &json!({ "payload": { "a": 1 } }));
    }
}
