use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use tracing::info;

use playback_session::logging::init_logging;
use playback_session::simulated::{
    demo_manifest, SimulatedSink, SimulatedStreaming, SimulatedTextRenderer, StaticManifestHandler,
};
use playback_session::{
    Cue, EventKind, Player, PlayerComponents, PlayerConfig, PlayerEvent, SchemeFetcher,
    SchemeRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("playback-demo")
        .version("1.0")
        .author("Video Streaming Team")
        .about("Runs a playback session against simulated collaborators")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .required(false),
        )
        .arg(
            Arg::new("uri")
                .short('u')
                .long("uri")
                .value_name("URI")
                .help("Manifest URI to load")
                .default_value("demo:big-buck-bunny"),
        )
        .arg(
            Arg::new("text-language")
                .short('t')
                .long("text-language")
                .value_name("LANG")
                .help("Preferred subtitle language")
                .required(false),
        )
        .arg(
            Arg::new("audio-language")
                .short('a')
                .long("audio-language")
                .value_name("LANG")
                .help("Preferred audio language")
                .required(false),
        )
        .arg(
            Arg::new("switch-audio")
                .long("switch-audio")
                .value_name("LANG")
                .help("Switch audio language after loading")
                .required(false),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Print session statistics as JSON before exiting")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => PlayerConfig::load_from_file(PathBuf::from(path))
            .await
            .with_context(|| format!("loading {}", path))?,
        None => PlayerConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(language) = matches.get_one::<String>("text-language") {
        config.preferred_text_language = language.clone();
    }
    if let Some(language) = matches.get_one::<String>("audio-language") {
        config.preferred_audio_language = language.clone();
    }
    config.validate()?;

    // Initialize logging
    init_logging(&config.logging)?;

    let uri = matches
        .get_one::<String>("uri")
        .cloned()
        .unwrap_or_else(|| "demo:big-buck-bunny".to_string());

    let registry = SchemeRegistry::new().with_scheme(
        "demo",
        Arc::new(StaticManifestHandler::new(demo_manifest(&uri)).with_delay(Duration::from_millis(50))),
    );
    let streaming = Arc::new(SimulatedStreaming::new());
    let renderer = Arc::new(SimulatedTextRenderer::new());
    let player = Player::new(
        PlayerComponents {
            fetcher: Arc::new(SchemeFetcher::new(registry)),
            streaming: streaming.clone(),
            text_renderer_factory: SimulatedTextRenderer::shared_factory(renderer.clone()),
        },
        config,
    );

    for kind in [
        EventKind::StateChanged,
        EventKind::Loaded,
        EventKind::VariantChanged,
        EventKind::TextChanged,
        EventKind::TextTrackVisibility,
        EventKind::Error,
    ] {
        player.add_event_listener(kind, |event: &PlayerEvent| {
            println!("event: {}", serde_json::to_string(event)?);
            Ok(())
        });
    }

    let sink = Arc::new(SimulatedSink::new());
    player.attach(Some(sink.clone()), true).await?;
    player.load(&uri).await?;

    if let Some(notifier) = streaming.notifier() {
        notifier.append_text_cues(vec![
            Cue::new(0.0, 2.5, "[music]"),
            Cue::new(2.5, 5.0, "Hello there."),
        ]);
    }
    info!(
        "Text visible: {}, {} cue(s) buffered",
        player.is_text_track_visible(),
        renderer.cues().len()
    );

    if let Some(language) = matches.get_one::<String>("switch-audio") {
        player.select_audio_language(language, None)?;
    }

    for track in player.get_variant_tracks() {
        println!(
            "variant {:>2} {:<3} {:>9} bps{}",
            track.id,
            track.language,
            track.bandwidth.unwrap_or(0),
            if track.active { "  *" } else { "" }
        );
    }
    for track in player.get_text_tracks() {
        println!(
            "text    {:>2} {:<3}{}",
            track.id,
            track.language,
            if track.active { "  *" } else { "" }
        );
    }

    if matches.get_flag("stats") {
        println!("{}", serde_json::to_string_pretty(&player.get_stats())?);
    }

    player.destroy().await;
    Ok(())
}
