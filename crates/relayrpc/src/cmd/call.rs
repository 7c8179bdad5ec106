use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use relayrpc_codec::{from_json, Closure, Value};
use relayrpc_peer::{call_once_with_config, connect_with_config, ConnectionConfig, PeerError};
use relayrpc_transport::Endpoint;
use tracing::info;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_call, print_chunk, render, CallOutput, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint: Endpoint = args
        .endpoint
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))?;
    let timeout = parse_duration(&args.timeout)?;
    let mut call_args = parse_args(args.args.as_deref())?;
    if args.callback {
        call_args.push(Value::Function(callback()));
    }

    let mut config = ConnectionConfig::default().with_serialization(args.serialization);
    config.handshake.timeout = timeout;

    let started = Instant::now();
    let (mode, peer_id, result) = if args.single_shot {
        let value = bounded(
            timeout,
            call_once_with_config(&endpoint, &args.function, call_args, &config),
        )
        .await
        .map_err(|err| peer_error("call failed", err))?;
        ("single-shot", None, render(&resolve(value).await))
    } else {
        let conn = bounded(timeout, connect_with_config(&endpoint, &config))
            .await
            .map_err(|err| peer_error("connect failed", err))?;
        let value = conn
            .invoke_with_timeout(&args.function, call_args, timeout)
            .await
            .map_err(|err| peer_error("call failed", err))?;
        let result = match value {
            Value::Stream(mut stream) if format.is_incremental() => {
                let mut count = 0;
                while let Some(chunk) = stream.recv().await {
                    print_chunk(count, &resolve(chunk).await, format);
                    count += 1;
                }
                serde_json::json!({ "chunks": count })
            }
            value => render(&resolve(value).await),
        };
        let peer_id = conn.peer_id().to_string();
        conn.close();
        ("persistent", Some(peer_id), result)
    };

    print_call(
        &CallOutput {
            function: &args.function,
            mode,
            serialization: args.serialization.as_str(),
            peer_id: peer_id.as_deref(),
            elapsed_ms: started.elapsed().as_millis(),
            result,
        },
        format,
    );
    Ok(SUCCESS)
}

async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, PeerError>>,
) -> Result<T, PeerError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| PeerError::Timeout(timeout))?
}

/// `--args` as call arguments: a JSON array spreads, anything else is one
/// argument.
fn parse_args(input: Option<&str>) -> CliResult<Vec<Value>> {
    let Some(input) = input else {
        return Ok(Vec::new());
    };
    let json: serde_json::Value = serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("--args is not valid JSON: {err}")))?;
    Ok(match from_json(json) {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// The closure `--callback` passes along. Returns its first argument.
fn callback() -> Closure {
    Closure::new(|mut args| async move {
        let value = if args.is_empty() {
            Value::Undefined
        } else {
            args.swap_remove(0)
        };
        info!(argument = %value, "callback invoked");
        Ok(value)
    })
}

/// Drain streams and await pending values so the whole result can be
/// printed. A rejected pending value becomes `{"rejected": reason}`.
fn resolve(value: Value) -> Pin<Box<dyn Future<Output = Value> + Send>> {
    Box::pin(async move {
        match value {
            Value::Stream(stream) => {
                let mut items = Vec::new();
                for chunk in stream.into_vec().await {
                    items.push(resolve(chunk).await);
                }
                Value::Array(items)
            }
            Value::Pending(pending) => match pending.await {
                Ok(value) => resolve(value).await,
                Err(rejection) => Value::object([("rejected", rejection.into_value())]),
            },
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(resolve(item).await);
                }
                Value::Array(resolved)
            }
            Value::Object(entries) => {
                let mut resolved = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    resolved.push((key, resolve(item).await));
                }
                Value::Object(resolved)
            }
            other => other,
        }
    })
}

#[cfg(test)]
mod tests {
    use relayrpc_codec::{PendingValue, ValueStream};

    use super::*;

    #[test]
    fn args_spread_arrays() {
        assert_eq!(
            parse_args(Some("[\"hello\", 2]")).unwrap(),
            vec![Value::from("hello"), Value::Int(2)]
        );
        assert_eq!(parse_args(Some("7")).unwrap(), vec![Value::Int(7)]);
        assert!(parse_args(None).unwrap().is_empty());
        assert_eq!(parse_args(Some("{oops")).unwrap_err().code, USAGE);
    }

    #[tokio::test]
    async fn resolve_drains_nested_handles() {
        let value = Value::object([
            ("numbers", Value::Stream(ValueStream::from_values([1, 2]))),
            (
                "later",
                Value::Pending(PendingValue::fulfilled(Value::Stream(
                    ValueStream::from_values(["x"]),
                ))),
            ),
            (
                "refused",
                Value::Pending(PendingValue::rejected(Value::from("no"))),
            ),
        ]);
        assert_eq!(
            render(&resolve(value).await),
            serde_json::json!({
                "numbers": [1, 2],
                "later": ["x"],
                "refused": {"rejected": "no"}
            })
        );
    }

    #[tokio::test]
    async fn callback_returns_first_argument() {
        assert_eq!(
            callback().call(vec![Value::Int(4), Value::Null]).await,
            Ok(Value::Int(4))
        );
    }
}
