use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use ratatui::DefaultTerminal;
use sdfview::error_display::{
    user_message_from_dataset, user_message_from_rejection, user_message_from_report,
};
use sdfview::{
    export, logging, source, App, AppConfig, AppEvent, Args, CacheManager, ConfigManager,
    LoadOptions, RenderCache, Session, StartupView, StructureRenderer, APP_NAME,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

fn render(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    terminal.draw(|frame| frame.render_widget(app, frame.area()))?;
    Ok(())
}

fn run(mut terminal: DefaultTerminal, args: &Args, config: AppConfig, path: PathBuf) -> Result<()> {
    let (tx, rx) = channel::<AppEvent>();
    let poll_interval = Duration::from_millis(config.performance.event_poll_interval_ms);
    let options = LoadOptions::from_config(&config, args.format);
    let startup = StartupView::from_args(args, &config)?;
    let mut app = App::new(tx.clone(), config).with_startup_view(startup);
    if args.debug {
        app.enable_debug();
    }
    render(&mut terminal, &mut app)?;
    tx.send(AppEvent::Open(path, options))?;

    loop {
        if crossterm::event::poll(poll_interval)? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key) => tx.send(AppEvent::Key(key))?,
                crossterm::event::Event::Resize(cols, rows) => {
                    tx.send(AppEvent::Resize(cols, rows))?
                }
                _ => {}
            }
        }

        let updated = match rx.recv_timeout(Duration::from_millis(0)) {
            Ok(event) => {
                match event {
                    AppEvent::Exit => break,
                    AppEvent::Crash(msg) => {
                        return Err(eyre!(msg));
                    }
                    event => {
                        if let Some(event) = app.event(&event) {
                            tx.send(event)?;
                        }
                    }
                }
                true
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => false,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if updated {
            render(&mut terminal, &mut app)?;
        }
    }
    Ok(())
}

/// `--print` / `--export-html`: one pass, written out, no terminal UI.
fn run_batch(args: &Args, config: &AppConfig, path: &Path) -> Result<()> {
    let options = LoadOptions::from_config(config, args.format);
    let dataset = source::load(path, &options).map_err(|e| eyre!(user_message_from_dataset(&e)))?;

    let cache = Arc::new(RenderCache::with_capacity(config.performance.cache_capacity));
    let mut session = Session::new(
        dataset,
        Arc::clone(&cache),
        Arc::new(StructureRenderer::new()),
        config.display.page_size,
    );
    StartupView::from_args(args, config)?.apply(&mut session, config.filter.max_range_columns)?;
    let page = session
        .view()
        .map_err(|r| eyre!(user_message_from_rejection(&r)))?;

    if args.print {
        println!("{}", export::page_to_json(&page)?);
    }
    if let Some(out) = &args.export_html {
        let title = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(APP_NAME);
        export::write_html(&page, title, out)?;
        eprintln!("{} written to {}", page.status(), out.display());
    }
    if args.stats {
        eprintln!("{}", export::stats_to_json(&cache.stats())?);
    }
    Ok(())
}

fn handle_early_exit_flags(args: &Args) -> Result<Option<()>> {
    if args.clear_cache {
        match CacheManager::new(APP_NAME) {
            Ok(cache) => {
                if let Err(e) = cache.clear_all() {
                    eprintln!("Error clearing cache: {}", e);
                    std::process::exit(1);
                }
                println!("Cache cleared successfully");
                return Ok(Some(()));
            }
            Err(_e) => {
                println!("No cache to clear");
                return Ok(Some(()));
            }
        }
    }

    if args.generate_config {
        let manager = ConfigManager::new(APP_NAME)?;
        match manager.write_default_config(args.force) {
            Ok(path) => {
                println!("Configuration written to {}", path.display());
                return Ok(Some(()));
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(None)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(()) = handle_early_exit_flags(&args)? {
        return Ok(());
    }

    color_eyre::install()?;

    let mut config = AppConfig::load(APP_NAME).unwrap_or_else(|e| {
        eprintln!("Warning: {}. Using default configuration.", e);
        AppConfig::default()
    });
    config.apply_args(&args);
    config.validate()?;

    if let Ok(cache) = CacheManager::new(APP_NAME) {
        logging::init(&config, cache.cache_dir());
    }

    let path = args
        .path
        .clone()
        .ok_or_else(|| eyre!("A PATH to an SDF, CSV or TSV file is required"))?;

    if args.is_batch() {
        if let Err(e) = run_batch(&args, &config, &path) {
            eprintln!("Error: {}", user_message_from_report(&e, None));
            std::process::exit(1);
        }
        return Ok(());
    }

    let path_for_errors = path.clone();
    let terminal = ratatui::init();
    let result = run(terminal, &args, config, path);
    ratatui::restore();
    if let Err(e) = result {
        eprintln!("Error: {}", user_message_from_report(&e, Some(&path_for_errors)));
        std::process::exit(1);
    }
    Ok(())
}
