//! Operation shape inference.
//!
//! The rules are an ordered table evaluated top to bottom; the first rule
//! that applies decides the operation:
//!
//! | Order | Rule | Applies when | Operation |
//! |-------|------|--------------|-----------|
//! | 1 | `Override` | `_action` argument present | Transition |
//! | 2 | `Declared` | manifest declares `operation` | as declared |
//! | 3 | `InferredFromShape` | always | Update if `id` present, else Create |

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{HubError, HubResult};
use crate::types::{Capability, OperationKind};

/// Argument that forces a transition and names it.
pub const ACTION_ARG: &str = "_action";

/// Argument carrying the target resource identifier.
pub const ID_ARG: &str = "id";

/// Which row of the decision table produced the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeRule {
    Override,
    Declared,
    InferredFromShape,
}

/// Resolved shape of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallShape {
    pub operation: OperationKind,
    pub rule: ShapeRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Apply the decision table.
///
/// `_action` is removed from `args`; everything else is left for the body.
pub(crate) fn infer_shape(
    capability: &Capability,
    args: &mut Map<String, Value>,
) -> HubResult<CallShape> {
    let invalid = |message: String| HubError::InvalidArguments {
        name: capability.name.clone(),
        message,
    };

    let override_action = match args.remove(ACTION_ARG) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(_) => return Err(invalid(format!("{ACTION_ARG} must be a non-empty string"))),
    };
    let id = scalar_arg(args, ID_ARG).map_err(invalid)?;

    let (operation, rule) = if override_action.is_some() {
        (OperationKind::Transition, ShapeRule::Override)
    } else if let Some(declared) = capability.operation_kind {
        (declared, ShapeRule::Declared)
    } else if id.is_some() {
        (OperationKind::Update, ShapeRule::InferredFromShape)
    } else {
        (OperationKind::Create, ShapeRule::InferredFromShape)
    };

    let action = match operation {
        OperationKind::Transition => {
            let action = override_action
                .or_else(|| capability.action.clone())
                .ok_or_else(|| invalid("transition requires an action name".to_string()))?;
            Some(action)
        }
        _ => None,
    };

    if operation != OperationKind::Create && id.is_none() {
        return Err(invalid(format!(
            "{} requires an {ID_ARG} argument",
            operation_label(operation)
        )));
    }

    Ok(CallShape {
        operation,
        rule,
        id: if operation == OperationKind::Create {
            None
        } else {
            id
        },
        action,
    })
}

/// String or integer argument rendered as a path segment.
pub(crate) fn scalar_arg(args: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(format!("{key} must be a non-empty string or a number")),
    }
}

fn operation_label(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::Create => "create",
        OperationKind::Update => "update",
        OperationKind::Transition => "transition",
    }
}
