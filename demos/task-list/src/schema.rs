// SPDX-License-Identifier: Apache-2.0
//! The `task-list` domain schema: `createTask`, `deleteTask`, and a
//! `notifyAssignee` action that exercises the compute→effect→apply loop.

use std::collections::BTreeMap;

use intent_core::{ActionSpec, ComputedFieldSpec, DomainSchema, ExprNode, FieldSpec, FlowNode, PatchOp};

/// Builds the `task-list` schema and stamps its content hash.
#[must_use]
pub fn build() -> DomainSchema {
    let mut state_fields = BTreeMap::new();
    state_fields.insert("tasks".to_owned(), FieldSpec::Array(Box::new(FieldSpec::Any)));
    state_fields.insert(
        "selectedTaskId".to_owned(),
        FieldSpec::Nullable(Box::new(FieldSpec::String)),
    );
    state_fields.insert("loading".to_owned(), FieldSpec::Bool);
    state_fields.insert("response".to_owned(), FieldSpec::Any);

    let mut computed_fields = BTreeMap::new();
    computed_fields.insert(
        "openTaskCount".to_owned(),
        ComputedFieldSpec {
            expr: ExprNode::Len(Box::new(ExprNode::Filter {
                array: Box::new(ExprNode::Get("data.tasks".to_owned())),
                predicate: Box::new(ExprNode::IsNull(Box::new(ExprNode::Get(
                    "$item.deletedAt".to_owned(),
                )))),
            })),
            deps: vec!["data.tasks".to_owned()],
        },
    );

    let mut actions = BTreeMap::new();
    actions.insert("createTask".to_owned(), ActionSpec { flow: create_task_flow(), available: None });
    actions.insert("deleteTask".to_owned(), ActionSpec { flow: delete_task_flow(), available: None });
    actions.insert(
        "notifyAssignee".to_owned(),
        ActionSpec {
            flow: notify_assignee_flow(),
            available: None,
        },
    );

    let mut schema = DomainSchema {
        id: "task-list".to_owned(),
        version: 1,
        hash: [0u8; 32],
        state_fields,
        computed_fields,
        actions,
    };
    schema.hash = schema_hash(&schema);
    schema
}

fn schema_hash(schema: &DomainSchema) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"task-list-demo:schema:v1");
    hasher.update(schema.id.as_bytes());
    hasher.update(&schema.version.to_be_bytes());
    *hasher.finalize().as_bytes()
}

/// `createTask(input: {id, title})` — appends a task object to `data.tasks`
/// with `completed: false` and `deletedAt: null`.
fn create_task_flow() -> FlowNode {
    FlowNode::Patch {
        op: PatchOp::Set,
        path: "data.tasks".to_owned(),
        value: Some(ExprNode::Append {
            array: Box::new(ExprNode::Get("data.tasks".to_owned())),
            value: Box::new(ExprNode::Object(vec![
                ("id".to_owned(), ExprNode::Get("input.id".to_owned())),
                ("title".to_owned(), ExprNode::Get("input.title".to_owned())),
                ("completed".to_owned(), ExprNode::Literal(intent_core::Value::Bool(false))),
                ("deletedAt".to_owned(), ExprNode::Literal(intent_core::Value::Null)),
            ])),
        }),
    }
}

/// `deleteTask(input: {id})` — soft delete: stamps `deletedAt` on the
/// matching task rather than removing it from the array (§8 scenario 4),
/// and clears `selectedTaskId` if it pointed at the deleted task.
fn delete_task_flow() -> FlowNode {
    FlowNode::Seq(vec![
        FlowNode::Patch {
            op: PatchOp::Set,
            path: "data.tasks".to_owned(),
            value: Some(ExprNode::Map {
                array: Box::new(ExprNode::Get("data.tasks".to_owned())),
                transform: Box::new(ExprNode::If {
                    cond: Box::new(ExprNode::Eq(
                        Box::new(ExprNode::Get("$item.id".to_owned())),
                        Box::new(ExprNode::Get("input.id".to_owned())),
                    )),
                    then_branch: Box::new(ExprNode::MergeObj(vec![
                        ExprNode::Get("$item".to_owned()),
                        ExprNode::Object(vec![("deletedAt".to_owned(), ExprNode::Get("meta.timestamp".to_owned()))]),
                    ])),
                    else_branch: Box::new(ExprNode::Get("$item".to_owned())),
                }),
            }),
        },
        FlowNode::If {
            cond: ExprNode::Eq(
                Box::new(ExprNode::Get("data.selectedTaskId".to_owned())),
                Box::new(ExprNode::Get("input.id".to_owned())),
            ),
            then_branch: Box::new(FlowNode::Patch {
                op: PatchOp::Unset,
                path: "data.selectedTaskId".to_owned(),
                value: None,
            }),
            else_branch: None,
        },
    ])
}

/// `notifyAssignee(input: {taskId})` — raises a `notify` requirement, then
/// (once fulfilled) stores the handler's response and clears `loading`
/// (§8 scenario 5: "effect fulfill, continue, terminate").
fn notify_assignee_flow() -> FlowNode {
    let mut params = BTreeMap::new();
    params.insert("taskId".to_owned(), ExprNode::Get("input.taskId".to_owned()));
    FlowNode::Seq(vec![
        FlowNode::Patch {
            op: PatchOp::Set,
            path: "data.loading".to_owned(),
            value: Some(ExprNode::Literal(intent_core::Value::Bool(true))),
        },
        FlowNode::Effect {
            effect_type: "notify".to_owned(),
            params,
        },
        FlowNode::Halt { reason: None },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_all_three_actions() {
        let schema = build();
        assert!(schema.actions.contains_key("createTask"));
        assert!(schema.actions.contains_key("deleteTask"));
        assert!(schema.actions.contains_key("notifyAssignee"));
    }

    #[test]
    fn schema_hash_is_stable() {
        assert_eq!(build().hash, build().hash);
    }
}
