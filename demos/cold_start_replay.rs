//! Example: Cold-start replay of a quit-state notification tap
//!
//! Simulates the app being launched by a tap on a tray notification while it
//! was quit. A deep link that arrived before navigation was mounted is held in
//! a file-backed store, and the provider reports the tapped notification as
//! the initial notification. The cold-start routine routes exactly one of them.
//!
//! Run with: cargo run --example cold_start_replay

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kodegen_mobile_push::{
    AuthorizationState, BoxFuture, HostEvent, Navigator, ProviderEvent, PushPipeline, PushProvider,
    PushResult, RemoteMessage, StoreBackend, StoreBackendFactory,
};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Provider that always grants permission and reports one initial notification
struct ScriptedProvider {
    initial: parking_lot::Mutex<Option<RemoteMessage>>,
    events: parking_lot::Mutex<Option<mpsc::UnboundedSender<ProviderEvent>>>,
}

impl PushProvider for ScriptedProvider {
    fn has_permission(&self) -> BoxFuture<'_, PushResult<AuthorizationState>> {
        Box::pin(async { Ok(AuthorizationState::Authorized) })
    }

    fn request_permission(&self) -> BoxFuture<'_, PushResult<AuthorizationState>> {
        Box::pin(async { Ok(AuthorizationState::Authorized) })
    }

    fn get_token(&self) -> BoxFuture<'_, PushResult<String>> {
        Box::pin(async { Ok("demo-device-token".to_string()) })
    }

    fn delete_token(&self) -> BoxFuture<'_, PushResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn initial_notification(&self) -> BoxFuture<'_, PushResult<Option<RemoteMessage>>> {
        Box::pin(async move { Ok(self.initial.lock().take()) })
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.events.lock() = Some(sender);
        receiver
    }
}

/// Navigator that prints every route it is asked to open
#[derive(Default)]
struct ConsoleNavigator {
    mounted: AtomicBool,
}

impl Navigator for ConsoleNavigator {
    fn is_ready(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn navigate(&self, screen: &str, params: Option<&Map<String, Value>>) -> PushResult<()> {
        match params {
            Some(params) => println!("-> navigate({screen}, {})", Value::Object(params.clone())),
            None => println!("-> navigate({screen})"),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let store_path = std::env::temp_dir().join("kodegen-mobile-push-demo.json");
    let store = StoreBackendFactory::create_store(&StoreBackend::File(store_path.clone()));

    let provider = Arc::new(ScriptedProvider {
        initial: parking_lot::Mutex::new(Some(
            RemoteMessage::new()
                .with_id("0:1712000000%demo")
                .with_notification("Registration open", "Register for the June session")
                .with_data("screen", "RegisterExam")
                .with_data("params", r#"{"session":"2026-06"}"#),
        )),
        events: parking_lot::Mutex::new(None),
    });
    let navigator = Arc::new(ConsoleNavigator::default());

    let pipeline = PushPipeline::builder(provider, store, navigator.clone()).build()?;
    pipeline.initialize().await;

    // The OS hands over a deep link before the navigation root is mounted
    pipeline
        .host_events()
        .send(HostEvent::DeepLinkOpened("examreg://notification/Results".to_string()))?;
    tokio::task::yield_now().await;

    navigator.mounted.store(true, Ordering::SeqCst);
    pipeline.readiness().mark_ready();

    let report = pipeline.handle_cold_start().await;
    println!("Cold start dispatched: {:?}", report.dispatched);
    println!(
        "Background notifications while inactive: {}",
        report.background_notifications.len()
    );

    if let Some(token) = pipeline.tokens().current_token().await? {
        println!("Device token {} obtained at {}", token.value, token.obtained_at);
    }

    pipeline.unsubscribe();
    let _ = tokio::fs::remove_file(&store_path).await;
    Ok(())
}
