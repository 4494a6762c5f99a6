//! pronounce-rs: clipboard-driven pronunciation practice with TTS and IPA.

mod clipboard;
mod config;
mod context;
mod events;
#[cfg(feature = "gui")]
mod gui;
mod history;
mod instance;
mod notifier;
mod pronunciation;
mod settings;
mod speech;
mod update;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use context::{AppContext, SpeakOutcome};
use events::UiEvent;
use instance::{InstanceError, InstanceGuard};
use pronunciation::{IpaDictionary, MisakiConverter, Pronouncer};

#[derive(Parser, Debug)]
#[command(name = "pronounce-rs", version, about = "Hear English words spoken and see their IPA")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Run without a window: speak clipboard changes until Ctrl-C
    #[arg(long)]
    headless: bool,

    /// Speak one word, print its IPA and exit
    #[arg(long, value_name = "WORD")]
    say: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,reqwest=info,hyper_util=info,eframe=info,egui_glow=info")
    } else {
        EnvFilter::new("info,reqwest=warn,hyper_util=warn,eframe=warn,egui_glow=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("pronounce-rs {} starting", update::CURRENT_VERSION);

    let config = config::Config::load(args.config.as_deref());
    if let Err(e) = std::fs::create_dir_all(&config.paths.data_dir) {
        warn!("Cannot create {}: {e}", config.paths.data_dir.display());
    }

    // One-shot invocations don't need to exclude a running window.
    let _instance = if args.say.is_none() {
        match InstanceGuard::acquire(config.instance.port) {
            Ok(guard) => Some(guard),
            Err(InstanceError::AlreadyRunning(port)) => {
                warn!("Another instance is already running (port {port})");
                #[cfg(feature = "gui")]
                if !args.headless {
                    gui::show_error(
                        "Already Running",
                        "TTS Pronunciation Practice is already running.",
                    );
                }
                std::process::exit(1);
            }
            Err(e) => {
                warn!("{e}, continuing without single-instance check");
                None
            }
        }
    } else {
        None
    };

    let runtime = Runtime::new()?;

    let dictionary = IpaDictionary::load_or_download(
        &config.dictionary_path(),
        &config.dictionary.url,
        config.dictionary.download,
    );
    let pronouncer = Pronouncer::new(dictionary, Some(Box::new(MisakiConverter::new())));

    let (app, events) = AppContext::start(config, runtime.handle().clone());
    let app = Arc::new(app);

    let result = if let Some(word) = args.say.as_deref() {
        say_once(&app, events, &pronouncer, word, &runtime)
    } else if args.headless {
        run_headless(&app, events, &pronouncer, &runtime)
    } else {
        run_gui(&app, events, pronouncer, &runtime)
    };

    app.shutdown();
    runtime.shutdown_timeout(std::time::Duration::from_millis(500));
    result
}

#[cfg(feature = "gui")]
fn run_gui(
    app: &Arc<AppContext>,
    events: UnboundedReceiver<UiEvent>,
    pronouncer: Pronouncer,
    _runtime: &Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = gui::run(app.clone(), events, pronouncer) {
        tracing::error!("Failed to start the window: {e}");
        gui::show_error("Startup Error", &format!("Failed to start the application:\n{e}"));
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(not(feature = "gui"))]
fn run_gui(
    app: &Arc<AppContext>,
    events: UnboundedReceiver<UiEvent>,
    pronouncer: Pronouncer,
    runtime: &Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Built without the window, running headless");
    run_headless(app, events, &pronouncer, runtime)
}

fn say_once(
    app: &AppContext,
    mut events: UnboundedReceiver<UiEvent>,
    pronouncer: &Pronouncer,
    word: &str,
    runtime: &Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{word}: {}", pronouncer.describe(word, true).display_text());

    let id = match app.speak(word) {
        SpeakOutcome::Started(id) => id,
        SpeakOutcome::Disabled => {
            warn!("TTS is disabled in settings");
            return Ok(());
        }
        SpeakOutcome::Ignored => return Ok(()),
    };

    runtime.block_on(async {
        while let Some(event) = events.recv().await {
            match event {
                UiEvent::SpeechFinished { request } if request == id => return Ok(()),
                UiEvent::SpeechFailed { request, error } if request == id => {
                    return Err(error.into());
                }
                _ => {}
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn run_headless(
    app: &AppContext,
    mut events: UnboundedReceiver<UiEvent>,
    pronouncer: &Pronouncer,
    runtime: &Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    let watcher = app.start_clipboard_watcher();
    app.spawn_update_check();
    info!("Watching the clipboard, press Ctrl-C to quit");

    runtime.block_on(async {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Interrupted");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    handle_headless_event(app, pronouncer, event);
                }
            }
        }
    });

    app.shutdown();
    if let Err(e) = runtime.block_on(watcher) {
        warn!("Clipboard monitor ended abnormally: {e}");
    }
    Ok(())
}

fn handle_headless_event(app: &AppContext, pronouncer: &Pronouncer, event: UiEvent) {
    match event {
        UiEvent::ClipboardText(text) => {
            let settings = app.settings();
            let ipa = pronouncer.describe(&text, settings.show_ipa);
            info!("{text}  {}", ipa.display_text());
            if settings.auto_speak {
                if let SpeakOutcome::Disabled = app.speak(&text) {
                    info!("TTS is disabled in settings");
                }
            }
        }
        UiEvent::SpeechFailed { error, .. } => warn!("TTS failed: {error}"),
        UiEvent::UpdateAvailable(info) => {
            info!("Version {} is available: {}", info.version, info.url);
            app.announce_update(&info, false);
        }
        _ => {}
    }
}
