//! Persistent connections between two real peers over an in-memory stream.

use std::time::Duration;

use relayrpc_codec::{
    Closure, CodecError, PendingValue, Rejection, Serialization, Value, ValueKind, ValueStream,
};
use relayrpc_peer::{
    accept_over, connect_over, Connection, ConnectionConfig, FunctionTable, PeerError, Role,
    Session,
};
use tokio::sync::oneshot;

fn functions() -> FunctionTable {
    FunctionTable::new()
        .with_function("echoReverse", |args| async move {
            let text = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
            let delay = args.get(1).and_then(Value::as_i64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            Ok(Value::from(text.chars().rev().collect::<String>()))
        })
        .with_function("add", |args| async move {
            let a = args.first().and_then(Value::as_i64).unwrap_or(0);
            let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::Int(a + b))
        })
        .with_function("countdown", |args| async move {
            let from = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::Stream(ValueStream::from_values((1..=from).rev())))
        })
        .with_function("sum", |mut args| async move {
            let stream = args
                .pop()
                .and_then(|v| v.into_stream().ok())
                .ok_or_else(|| Value::from("expected a stream"))?;
            let total: i64 = stream.into_vec().await.iter().filter_map(Value::as_i64).sum();
            Ok(Value::Int(total))
        })
        .with_function("later", |args| async move {
            let outcome = args.into_iter().next().unwrap_or(Value::Null);
            Ok(Value::Pending(PendingValue::new(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                match outcome {
                    Value::String(reason) if reason == "reject" => Err(Value::from("refused")),
                    other => Ok(other),
                }
            })))
        })
        .with_function("await", |mut args| async move {
            let pending = args
                .pop()
                .and_then(|v| v.into_pending().ok())
                .ok_or_else(|| Value::from("expected a pending value"))?;
            pending.await.map_err(Rejection::into_value)
        })
        .with_function("applyTwice", |mut args| async move {
            let arg = args.pop().unwrap_or(Value::Null);
            let f = args
                .pop()
                .and_then(|v| v.into_function().ok())
                .ok_or_else(|| Value::from("expected a function"))?;
            let once = f.call(vec![arg]).await?;
            f.call(vec![once]).await
        })
        .with_function("adder", |args| async move {
            let base = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::Function(Closure::new(move |args| async move {
                let n = args.first().and_then(Value::as_i64).unwrap_or(0);
                Ok(Value::Int(base + n))
            })))
        })
        .with_function("fillSink", |mut args| async move {
            let sink = args
                .pop()
                .and_then(|v| v.into_sink().ok())
                .ok_or_else(|| Value::from("expected a sink"))?;
            for word in ["one", "two", "three"] {
                sink.send(Value::from(word)).map_err(|_| Value::from("sink closed"))?;
            }
            Ok(Value::Null)
        })
        .with_function("fail", |args| async move {
            Err(args.into_iter().next().unwrap_or(Value::from("failed")))
        })
        .with_function("hang", |_| async {
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .with_function("openStream", |_| async {
            let (sink, stream) = ValueStream::channel();
            tokio::spawn(async move {
                let _sink = sink;
                std::future::pending::<()>().await;
            });
            Ok(Value::Stream(stream))
        })
}

async fn pair_with(server: ConnectionConfig, client: ConnectionConfig) -> (Connection, Connection) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (client, server) = tokio::join!(
        connect_over(client_io, &client),
        accept_over(server_io, "peer-1", &server)
    );
    let Session::Persistent(server) = server.unwrap() else {
        panic!("expected a persistent session");
    };
    (client.unwrap(), server)
}

async fn pair() -> (Connection, Connection) {
    pair_with(
        ConnectionConfig::default().with_functions(functions()),
        ConnectionConfig::default(),
    )
    .await
}

#[tokio::test]
async fn roles_and_peer_id() {
    let (client, server) = pair().await;
    assert_eq!(client.role(), Role::Initiator);
    assert_eq!(server.role(), Role::Acceptor);
    assert_eq!(client.peer_id(), "peer-1");
    assert_eq!(server.peer_id(), "peer-1");
}

#[tokio::test]
async fn replies_match_calls_out_of_order() {
    let (client, _server) = pair().await;
    let slow = client.invoke("echoReverse", vec![Value::from("slow"), Value::Int(60)]);
    let fast = client.invoke("echoReverse", vec![Value::from("fast"), Value::Int(0)]);
    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(slow.unwrap(), Value::from("wols"));
    assert_eq!(fast.unwrap(), Value::from("tsaf"));
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn back_to_back_calls_resolve_to_their_own_results() {
    let (client, _server) = pair().await;
    let (abc, xy) = tokio::join!(
        client.invoke("echoReverse", vec![Value::from("abc"), Value::Int(30)]),
        client.invoke("echoReverse", vec![Value::from("xy")])
    );
    assert_eq!(abc.unwrap(), Value::from("cba"));
    assert_eq!(xy.unwrap(), Value::from("yx"));
}

#[tokio::test]
async fn many_concurrent_calls() {
    let (client, _server) = pair().await;
    let calls: Vec<_> = (0..64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.invoke("add", vec![Value::Int(i), Value::Int(i)]).await })
        })
        .collect();
    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap(), Value::Int(2 * i as i64));
    }
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn stream_result() {
    let (client, _server) = pair().await;
    let stream = client
        .invoke("countdown", vec![Value::Int(3)])
        .await
        .unwrap()
        .into_stream()
        .unwrap();
    assert_eq!(
        stream.into_vec().await,
        vec![Value::Int(3), Value::Int(2), Value::Int(1)]
    );
}

#[tokio::test]
async fn stream_argument() {
    let (client, _server) = pair().await;
    let (sink, stream) = ValueStream::channel();
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.invoke("sum", vec![Value::Stream(stream)]).await }
    });
    for n in 1..=4 {
        sink.send(Value::Int(n)).unwrap();
        tokio::task::yield_now().await;
    }
    drop(sink);
    assert_eq!(call.await.unwrap().unwrap(), Value::Int(10));
}

#[tokio::test]
async fn promise_result_fulfills_and_rejects() {
    let (client, _server) = pair().await;
    let fulfilled = client
        .invoke("later", vec![Value::Int(5)])
        .await
        .unwrap()
        .into_pending()
        .unwrap();
    assert_eq!(fulfilled.await, Ok(Value::Int(5)));

    let rejected = client
        .invoke("later", vec![Value::from("reject")])
        .await
        .unwrap()
        .into_pending()
        .unwrap();
    assert_eq!(rejected.await, Err(Rejection::Reason(Value::from("refused"))));
}

#[tokio::test]
async fn promise_argument() {
    let (client, _server) = pair().await;
    let (resolver, pending) = PendingValue::channel();
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.invoke("await", vec![Value::Pending(pending)]).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    resolver.fulfill(Value::from("done"));
    assert_eq!(call.await.unwrap().unwrap(), Value::from("done"));
}

#[tokio::test]
async fn abandoned_promise_argument_is_rejected() {
    let (client, _server) = pair().await;
    let (resolver, pending) = PendingValue::channel();
    drop(resolver);
    let err = client
        .invoke("await", vec![Value::Pending(pending)])
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::Rejected(Value::String(reason)) if reason.contains("abandoned")));
}

#[tokio::test]
async fn closure_argument_is_called_back() {
    let (client, _server) = pair().await;
    let double = Closure::new(|args| async move {
        let n = args.first().and_then(Value::as_i64).unwrap_or(0);
        Ok(Value::Int(n * 2))
    });
    let result = client
        .invoke("applyTwice", vec![Value::Function(double), Value::Int(5)])
        .await
        .unwrap();
    assert_eq!(result, Value::Int(20));
}

#[tokio::test]
async fn closure_result_is_callable() {
    let (client, _server) = pair().await;
    let add_ten = client
        .invoke("adder", vec![Value::Int(10)])
        .await
        .unwrap()
        .into_function()
        .unwrap();
    assert_eq!(add_ten.call(vec![Value::Int(1)]).await, Ok(Value::Int(11)));
    assert_eq!(add_ten.call(vec![Value::Int(-4)]).await, Ok(Value::Int(6)));
}

#[tokio::test]
async fn closure_rejection_travels_back() {
    let (client, _server) = pair().await;
    let refuse = Closure::new(|_| async { Err(Value::from("no")) });
    let err = client
        .invoke("applyTwice", vec![Value::Function(refuse), Value::Null])
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::Rejected(reason) if reason == Value::from("no")));
}

#[tokio::test]
async fn sink_argument_receives_writes() {
    let (client, _server) = pair().await;
    let (sink, stream) = ValueStream::channel();
    client
        .invoke("fillSink", vec![Value::Sink(sink)])
        .await
        .unwrap();
    assert_eq!(
        stream.into_vec().await,
        vec![Value::from("one"), Value::from("two"), Value::from("three")]
    );
}

#[tokio::test]
async fn server_calls_client() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let client_functions =
        FunctionTable::new().with_function("whoami", |_| async { Ok(Value::from("client")) });
    let client_config = ConnectionConfig::default().with_functions(client_functions);
    let server_config = ConnectionConfig::default();
    let (client, server) = tokio::join!(
        connect_over(client_io, &client_config),
        accept_over(server_io, "peer-9", &server_config)
    );
    let _client = client.unwrap();
    let Session::Persistent(server) = server.unwrap() else {
        panic!("expected a persistent session");
    };
    assert_eq!(server.invoke("whoami", vec![]).await.unwrap(), Value::from("client"));
}

#[tokio::test]
async fn unknown_function() {
    let (client, _server) = pair().await;
    let err = client.invoke("nope", vec![]).await.unwrap_err();
    assert!(matches!(err, PeerError::UnknownFunction(name) if name == "nope"));
    // The connection survives.
    assert_eq!(
        client.invoke("add", vec![Value::Int(1), Value::Int(2)]).await.unwrap(),
        Value::Int(3)
    );
}

#[tokio::test]
async fn rejection_reason_is_relayed() {
    let (client, _server) = pair().await;
    let err = client
        .invoke("fail", vec![Value::object([("code", Value::Int(7))])])
        .await
        .unwrap_err();
    let PeerError::Rejected(reason) = err else {
        panic!("expected rejection, got {err}");
    };
    assert_eq!(reason.get("code"), Some(&Value::Int(7)));
}

#[tokio::test]
async fn undefined_result_is_not_a_failure() {
    let (client, _server) = pair_with(
        ConnectionConfig::default().with_functions(
            FunctionTable::new().with_function("nothing", |_| async { Ok(Value::Undefined) }),
        ),
        ConnectionConfig::default(),
    )
    .await;
    assert_eq!(client.invoke("nothing", vec![]).await.unwrap(), Value::Undefined);
}

#[tokio::test]
async fn timeout_releases_the_slot() {
    let (client, _server) = pair().await;
    let err = client
        .invoke_with_timeout("hang", vec![], Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::Timeout(_)));
    assert_eq!(client.in_flight(), 0);
    assert!(!client.is_closed());
}

#[tokio::test]
async fn close_fails_pending_calls_and_ends_streams() {
    let (client, server) = pair().await;
    let open = client
        .invoke("openStream", vec![])
        .await
        .unwrap()
        .into_stream()
        .unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn({
        let client = client.clone();
        async move {
            let _ = tx.send(client.invoke("hang", vec![]).await);
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.close();

    assert!(matches!(rx.await.unwrap(), Err(PeerError::Disconnected(_))));
    assert!(open.into_vec().await.is_empty());
    client.closed().await;
    assert_eq!(client.in_flight(), 0);
    assert!(matches!(
        client.invoke("add", vec![]).await,
        Err(PeerError::Disconnected(_))
    ));
}

#[tokio::test]
async fn json_connections_carry_plain_values_only() {
    let json = ConnectionConfig::default().with_serialization(Serialization::Json);
    let (client, _server) = pair_with(
        ConnectionConfig::default().with_functions(functions()),
        json,
    )
    .await;
    assert_eq!(client.serialization(), Serialization::Json);
    assert_eq!(
        client.invoke("add", vec![Value::Int(2), Value::Int(3)]).await.unwrap(),
        Value::Int(5)
    );

    let err = client
        .invoke("sum", vec![Value::Stream(ValueStream::from_values([1]))])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PeerError::Codec(CodecError::Unsupported(ValueKind::Stream))
    ));

    let err = client.invoke("countdown", vec![Value::Int(2)]).await.unwrap_err();
    assert!(matches!(err, PeerError::Rejected(Value::String(reason)) if reason.contains("could not be sent")));
}
