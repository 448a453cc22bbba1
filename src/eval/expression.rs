use std::cmp::Ordering;
use std::time::Duration;

use async_recursion::async_recursion;

use crate::ast::{CompareOp, Expression};

use super::value::Value;
use super::{EvalError, EvalResult, Interpreter};

impl Interpreter {
    #[async_recursion]
    pub(crate) async fn evaluate_expression(
        &mut self,
        expression: &Expression,
    ) -> EvalResult<Value> {
        match expression {
            Expression::Literal(literal) => Ok(Value::from(literal)),
            Expression::Identifier(name) => self.lookup(name),
            Expression::PropertyAccess { object, property } => {
                self.evaluate_property_access(object, property).await
            }
            Expression::MethodCall {
                object,
                method,
                arguments,
            } => self.evaluate_method_call(object, method, arguments).await,
            Expression::Comparison { op, left, right } => {
                let left = self.evaluate_expression(left).await?;
                let right = self.evaluate_expression(right).await?;
                evaluate_comparison(*op, &left, &right)
            }
        }
    }

    async fn evaluate_property_access(
        &mut self,
        object: &str,
        property: &str,
    ) -> EvalResult<Value> {
        let agent = self.resolve_agent_value(object)?;
        agent
            .get_property(property)
            .await
            .ok_or_else(|| EvalError::UnknownProperty {
                agent: object.to_string(),
                property: property.to_string(),
            })
    }

    /// Dispatches a method call on an agent-valued identifier to the four
    /// agent operations. Arguments are evaluated first; arity is enforced
    /// before anything reaches the agent.
    async fn evaluate_method_call(
        &mut self,
        object: &str,
        method: &str,
        arguments: &[Expression],
    ) -> EvalResult<Value> {
        let agent = self.resolve_agent_value(object)?;

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate_expression(argument).await?);
        }

        match method {
            "ask" => {
                if args.is_empty() {
                    return Err(EvalError::ArityMismatch {
                        method: method.to_string(),
                        expected: "at least 1",
                        got: args.len(),
                    });
                }
                let message = args[0].to_string();
                let timeout = match args.get(1) {
                    None => None,
                    Some(value) => Some(Duration::from_secs_f64(
                        value.as_number().ok_or_else(|| EvalError::TypeMismatch {
                            expected: "number of seconds".to_string(),
                            found: value.type_name().to_string(),
                        })?,
                    )),
                };
                let response = agent.ask(&message, timeout).await?;
                Ok(Value::String(response))
            }
            "tell" => {
                if args.len() != 1 {
                    return Err(EvalError::ArityMismatch {
                        method: method.to_string(),
                        expected: "exactly 1",
                        got: args.len(),
                    });
                }
                agent.tell(&args[0].to_string()).await;
                Ok(Value::String("message sent".to_string()))
            }
            "has_tool" => {
                if args.is_empty() {
                    return Err(EvalError::ArityMismatch {
                        method: method.to_string(),
                        expected: "at least 1",
                        got: args.len(),
                    });
                }
                let name = expect_string(&args[0])?;
                Ok(Value::Boolean(agent.has_tool(name).await))
            }
            "execute_tool" => {
                if args.is_empty() {
                    return Err(EvalError::ArityMismatch {
                        method: method.to_string(),
                        expected: "at least 1",
                        got: args.len(),
                    });
                }
                let name = expect_string(&args[0])?.to_string();
                let result = agent.execute_tool(&name, &args[1..]).await?;
                Ok(result)
            }
            _ => Err(EvalError::UnknownMethod(method.to_string())),
        }
    }
}

fn expect_string(value: &Value) -> EvalResult<&str> {
    value.as_str().ok_or_else(|| EvalError::TypeMismatch {
        expected: "string".to_string(),
        found: value.type_name().to_string(),
    })
}

/// Comparison over unwrapped primitives. Equality across mismatched
/// variants is simply false; ordering across mismatched variants is a
/// type error.
fn evaluate_comparison(op: CompareOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let result = match op {
        CompareOp::Eq => left == right,
        CompareOp::NotEq => left != right,
        CompareOp::Lt | CompareOp::Gt | CompareOp::LtEq | CompareOp::GtEq => {
            let ordering = partial_order(left, right)?;
            match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::LtEq => ordering != Ordering::Greater,
                CompareOp::GtEq => ordering != Ordering::Less,
                CompareOp::Eq | CompareOp::NotEq => unreachable!(),
            }
        }
    };
    Ok(Value::Boolean(result))
}

fn partial_order(left: &Value, right: &Value) -> EvalResult<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            a.partial_cmp(b).ok_or_else(|| EvalError::TypeMismatch {
                expected: "comparable numbers".to_string(),
                found: "NaN".to_string(),
            })
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(EvalError::TypeMismatch {
            expected: "two numbers or two strings".to_string(),
            found: format!("{} and {}", left.type_name(), right.type_name()),
        }),
    }
}
