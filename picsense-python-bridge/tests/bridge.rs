//! End-to-end dispatch tests against stub runtimes.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::oneshot;

use picsense_python_bridge::{
    invoke_on, ChannelId, Dispatcher, ErrorKind, InvocationRequest, InvocationResult, Invoker,
    MethodCall, Payload, PythonRuntimeError, RuntimeGate,
};

/// Echoes the last positional argument and counts invocations.
struct EchoRuntime {
    calls: AtomicUsize,
}

impl EchoRuntime {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Invoker for EchoRuntime {
    fn invoke(
        &self,
        _module: &str,
        _callable: &str,
        args: &[String],
    ) -> impl Future<Output = Result<String, PythonRuntimeError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = args.last().cloned().unwrap_or_default();
        async move { Ok(last) }
    }
}

/// Every invocation raises a callable fault.
struct FaultingRuntime;

impl Invoker for FaultingRuntime {
    fn invoke(
        &self,
        module: &str,
        callable: &str,
        _args: &[String],
    ) -> impl Future<Output = Result<String, PythonRuntimeError>> + Send {
        let callable = format!("{module}.{callable}");
        async move {
            Err(PythonRuntimeError::Call {
                callable,
                error: "RuntimeError: interpreter fault".to_string(),
            })
        }
    }
}

async fn ready_dispatcher<R: Invoker>(runtime: R) -> Arc<Dispatcher<R>> {
    let gate = Arc::new(RuntimeGate::new());
    gate.initialize(|| async { Ok::<_, io::Error>(runtime) })
        .await
        .unwrap();
    Arc::new(Dispatcher::new(gate))
}

#[tokio::test]
async fn download_round_trip_returns_output_dir() -> Result<()> {
    let dispatcher = ready_dispatcher(EchoRuntime::new()).await;

    let call = MethodCall::new("downloadInstagramImage")
        .arg("url", "https://example.com/p/abc")
        .arg("outputDir", "/tmp/out");
    let result = invoke_on(&dispatcher, ChannelId::InstagramDownloader, call).await;

    assert_eq!(
        result,
        InvocationResult::Success {
            payload: Payload::Text("/tmp/out".to_string())
        }
    );
    Ok(())
}

#[tokio::test]
async fn color_style_success_carries_raw_json_and_flag() -> Result<()> {
    let dispatcher = ready_dispatcher(EchoRuntime::new()).await;

    let call = MethodCall::new("analyzeColorStyle").arg("imagePath", r#"{"style": "warm"}"#);
    let result = invoke_on(&dispatcher, ChannelId::ImageAnalyzer, call).await;

    let InvocationResult::Success {
        payload: Payload::Object(map),
    } = result
    else {
        panic!("expected wrapped payload, got {result:?}");
    };
    assert_eq!(map["raw_json"], Value::String(r#"{"style": "warm"}"#.into()));
    assert_eq!(map["success"], Value::Bool(true));
    Ok(())
}

#[tokio::test]
async fn color_style_fault_reports_domain_failure_not_a_panic() -> Result<()> {
    let dispatcher = ready_dispatcher(FaultingRuntime).await;

    let call = MethodCall::new("analyzeColorStyle").arg("imagePath", "/tmp/photo.jpg");
    let result = invoke_on(&dispatcher, ChannelId::ImageAnalyzer, call).await;

    let InvocationResult::Success {
        payload: Payload::Object(map),
    } = result
    else {
        panic!("expected wrapped payload, got {result:?}");
    };
    assert_eq!(map["success"], Value::Bool(false));
    let Value::String(message) = &map["error"] else {
        panic!("expected error message");
    };
    assert!(message.contains("interpreter fault"));
    Ok(())
}

#[tokio::test]
async fn analyze_fault_surfaces_the_analysis_error_code() -> Result<()> {
    let dispatcher = ready_dispatcher(FaultingRuntime).await;

    let call = MethodCall::new("analyzeImage").arg("imagePath", "/tmp/photo.jpg");
    let result = invoke_on(&dispatcher, ChannelId::ImageAnalyzer, call).await;

    let InvocationResult::Error { kind, code, .. } = result else {
        panic!("expected error reply, got {result:?}");
    };
    assert_eq!(kind, ErrorKind::RuntimeInvocation);
    assert_eq!(code, "ANALYSIS_ERROR");
    Ok(())
}

#[tokio::test]
async fn missing_argument_fails_without_invoking_the_runtime() -> Result<()> {
    let gate = Arc::new(RuntimeGate::new());
    gate.initialize(|| async { Ok::<_, io::Error>(EchoRuntime::new()) })
        .await?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&gate)));

    let result = invoke_on(
        &dispatcher,
        ChannelId::ImageAnalyzer,
        MethodCall::new("analyzeImage"),
    )
    .await;
    assert_eq!(result, InvocationResult::invalid_argument("imagePath"));

    let runtime = gate.await_ready().await?;
    assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_operation_replies_not_implemented_on_both_channels() -> Result<()> {
    let dispatcher = ready_dispatcher(EchoRuntime::new()).await;

    for channel in [ChannelId::ImageAnalyzer, ChannelId::InstagramDownloader] {
        let result = invoke_on(&dispatcher, channel, MethodCall::new("enhanceImage")).await;
        assert_eq!(result, InvocationResult::NotImplemented);
    }
    Ok(())
}

#[tokio::test]
async fn requests_before_ready_are_released_together() -> Result<()> {
    let gate = Arc::new(RuntimeGate::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&gate)));

    let mut replies = Vec::new();
    for i in 0..4 {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = InvocationRequest {
            channel: ChannelId::InstagramDownloader,
            operation: "downloadInstagramImage".to_string(),
            args: vec![
                Some("https://example.com/p/abc".to_string()),
                Some(format!("/tmp/out-{i}")),
            ],
            reply_to: reply_tx,
        };
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.handle(request).await });
        replies.push((i, reply_rx));
    }

    // No callable may run before the gate opens.
    tokio::time::sleep(Duration::from_millis(20)).await;
    for (_, reply) in &mut replies {
        assert!(reply.try_recv().is_err());
    }

    gate.initialize(|| async { Ok::<_, io::Error>(EchoRuntime::new()) })
        .await?;

    for (i, reply) in replies {
        let result = reply.await?;
        assert_eq!(
            result,
            InvocationResult::Success {
                payload: Payload::Text(format!("/tmp/out-{i}"))
            }
        );
    }

    let runtime = gate.await_ready().await?;
    assert_eq!(runtime.calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn failed_bootstrap_rejects_blocked_and_subsequent_calls() -> Result<()> {
    let gate: Arc<RuntimeGate<EchoRuntime>> = Arc::new(RuntimeGate::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&gate)));

    let call = MethodCall::new("analyzeImage").arg("imagePath", "/tmp/photo.jpg");
    let blocked = {
        let dispatcher = Arc::clone(&dispatcher);
        let call = call.clone();
        tokio::spawn(async move { invoke_on(&dispatcher, ChannelId::ImageAnalyzer, call).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    let outcome = gate
        .initialize(|| async {
            Err::<EchoRuntime, _>(io::Error::new(io::ErrorKind::NotFound, "interpreter missing"))
        })
        .await;
    assert!(outcome.is_err());

    // The blocked caller and every later caller see the same failure.
    for result in [
        blocked.await?,
        invoke_on(&dispatcher, ChannelId::ImageAnalyzer, call).await,
    ] {
        let InvocationResult::Error { kind, code, message } = result else {
            panic!("expected bootstrap failure, got {result:?}");
        };
        assert_eq!(kind, ErrorKind::RuntimeBootstrap);
        assert_eq!(code, "BOOTSTRAP_ERROR");
        assert!(message.contains("interpreter missing"));
    }
    Ok(())
}
