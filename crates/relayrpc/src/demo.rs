//! Functions exported by `relayrpc serve`, one per kind of relayed value.

use std::time::Duration;

use relayrpc_codec::{PendingValue, Value, ValueStream};
use relayrpc_peer::FunctionTable;

/// The demo function set.
///
/// | Name | Arguments | Result |
/// |---|---|---|
/// | `echoReverse` | text | text reversed |
/// | `add` | integers | their sum |
/// | `countdown` | n | stream of n, n-1, ..., 1 |
/// | `delayed` | value, millis | pending value settling to `value` |
/// | `applyTwice` | value, closure | `closure(closure(value))` |
/// | `fail` | reason | rejected with `reason` |
pub fn demo_functions() -> FunctionTable {
    FunctionTable::new()
        .with_function("echoReverse", |args| async move {
            let text = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| Value::from("echoReverse expects a string"))?;
            Ok(Value::from(text.chars().rev().collect::<String>()))
        })
        .with_function("add", |args| async move {
            let mut sum: i64 = 0;
            for arg in &args {
                let n = arg
                    .as_i64()
                    .ok_or_else(|| Value::from(format!("add expects integers, got {arg}")))?;
                sum = sum
                    .checked_add(n)
                    .ok_or_else(|| Value::from("add overflowed"))?;
            }
            Ok(Value::Int(sum))
        })
        .with_function("countdown", |args| async move {
            let from = args.first().and_then(Value::as_i64).unwrap_or(3).max(0);
            let (sink, stream) = ValueStream::channel();
            tokio::spawn(async move {
                for n in (1..=from).rev() {
                    if sink.send(Value::Int(n)).is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            });
            Ok(Value::Stream(stream))
        })
        .with_function("delayed", |mut args| async move {
            let millis = args.get(1).and_then(Value::as_i64).unwrap_or(100).max(0);
            let value = if args.is_empty() {
                Value::Null
            } else {
                args.swap_remove(0)
            };
            Ok(Value::Pending(PendingValue::new(async move {
                tokio::time::sleep(Duration::from_millis(millis as u64)).await;
                Ok(value)
            })))
        })
        .with_function("applyTwice", |mut args| async move {
            let f = args
                .pop()
                .and_then(|v| v.into_function().ok())
                .ok_or_else(|| Value::from("applyTwice expects (value, function)"))?;
            let value = args.pop().unwrap_or(Value::Null);
            let once = f.call(vec![value]).await?;
            f.call(vec![once]).await
        })
        .with_function("fail", |args| async move {
            Err(args
                .into_iter()
                .next()
                .unwrap_or_else(|| Value::from("failed on request")))
        })
}
