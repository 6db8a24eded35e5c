//! Late-rendering widget demonstration.
//!
//! Demonstrates:
//! - wait_for_element (one-shot, resolves when the element appears)
//! - observe_selector (late-binding observer with timeout)
//! - observe_selectors (one watch per matching element)
//! - wait_for_element_timeout (timeout handling)
//! - poll and debounce
//!
//! Usage:
//!   cargo run --example late_widget
//!   cargo run --example late_widget -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use element_watch::{
    MemoryDocument, MutationKindSet, ObserveOptions, Result, Watcher, debounce, poll,
};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "element_watch=trace"
    } else {
        "element_watch=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    println!("=== Late Widget ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    let document = MemoryDocument::new();
    let container = document.append_new(document.body(), "div", &[("id", "container")])?;
    let watcher = Watcher::new(document.clone());

    println!("[Setup] Scheduling dynamic elements...");
    let page = document.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(500)).await;
        let _ = page.append_new(container, "div", &[("id", "chat-widget")]);

        sleep(Duration::from_millis(500)).await;
        for i in 0..3 {
            let index = i.to_string();
            let attributes = [("class", "item"), ("data-index", index.as_str())];
            let _ = page.append_new(container, "div", &attributes);
            sleep(Duration::from_millis(50)).await;
        }
    });
    println!("        ✓ Scheduled\n");

    // ========================================================================
    // observe_selector (late binding)
    // ========================================================================

    println!("[1] observe_selector('#chat-widget')");
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    let widget_watch = watcher.observe_selector(
        "#chat-widget",
        move |element, record| {
            counter.fetch_add(1, Ordering::SeqCst);
            println!("    → {element} changed: {:?} {:?}", record.kind, record.attribute_name);
        },
        ObserveOptions::new()
            .with_kinds(MutationKindSet::new().with_attribute_old_value(true))
            .with_timeout(Duration::from_secs(5))
            .on_timeout(|| println!("    → widget watch timed out")),
    )?;
    println!("    ✓ Handle ready before the widget exists ({})\n", widget_watch.id());

    // ========================================================================
    // wait_for_element (one-shot)
    // ========================================================================

    println!("[2] wait_for_element('#chat-widget')");
    let start = tokio::time::Instant::now();
    let widget = watcher.wait_for_element("#chat-widget").await?;
    println!("    ✓ Found {widget} in {:?}", start.elapsed());

    sleep(Duration::from_millis(10)).await;
    document.set_attribute(widget, "data-state", "open")?;
    document.set_attribute(widget, "data-state", "minimized")?;
    sleep(Duration::from_millis(10)).await;
    println!("    ✓ Records delivered: {}\n", changes.load(Ordering::SeqCst));

    // ========================================================================
    // observe_selectors (every match)
    // ========================================================================

    println!("[3] observe_selectors('.item')");
    let items = watcher.observe_selectors(
        ".item",
        |element, record| println!("    → item {element}: {:?}", record.kind),
        ObserveOptions::new(),
    )?;

    let found = watcher.wait_for_elements(".item").await?;
    println!("    First batch: {} item(s)", found.len());
    sleep(Duration::from_millis(300)).await;
    println!("    ✓ Watching {} item(s)", items.watched_count());

    for item in items.watched() {
        document.set_attribute(item, "data-seen", "yes")?;
    }
    sleep(Duration::from_millis(10)).await;
    items.cancel();
    println!("    ✓ Cancelled\n");

    // ========================================================================
    // wait_for_element_timeout (should time out)
    // ========================================================================

    println!("[4] wait_for_element_timeout (expect timeout)");
    match watcher
        .wait_for_element_timeout("#never", Duration::from_millis(300))
        .await
    {
        Ok(_) => println!("    ✗ Unexpectedly found element!"),
        Err(e) => println!("    ✓ Correctly timed out: {e}\n"),
    }

    // ========================================================================
    // poll / debounce
    // ========================================================================

    println!("[5] poll + debounce");
    let saves = Arc::new(AtomicUsize::new(0));
    let save_counter = Arc::clone(&saves);
    let save = debounce(
        move |text: String| {
            save_counter.fetch_add(1, Ordering::SeqCst);
            println!("    → saved '{text}'");
        },
        Duration::from_millis(150),
        false,
    )?;

    let typed = Arc::new(AtomicUsize::new(0));
    let keystrokes = poll(
        move || {
            let n = typed.fetch_add(1, Ordering::SeqCst) + 1;
            save.call("x".repeat(n));
        },
        Duration::from_millis(40),
    )?;
    sleep(Duration::from_millis(250)).await;
    keystrokes.cancel();
    sleep(Duration::from_millis(200)).await;
    println!("    ✓ Saves after burst: {}\n", saves.load(Ordering::SeqCst));

    widget_watch.cancel();
    println!("=== Done ===");
    Ok(())
}
