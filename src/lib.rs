pub mod clean;
pub mod cli;
pub mod data;
pub mod header;
pub mod io_utils;
pub mod join;
pub mod preview;
pub mod settings;
pub mod sheet;
pub mod table;
pub mod workspace;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, InputOptions},
    settings::Settings,
    sheet::{HeaderChoice, Sheet},
    workspace::{JoinRequest, LookupSelection, SheetAddress, Workbook, Workspace},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging(level: LevelFilter) {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("multi_lookup", level);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.settings)
        .with_context(|| format!("Loading settings from {:?}", cli.settings))?;
    init_logging(settings.level_filter().unwrap_or(LevelFilter::Info));
    if settings.level_filter().is_none() {
        warn!("Ignoring unknown log level '{}'", settings.log_level);
    }
    match cli.command {
        Commands::Detect(args) => handle_detect(&args),
        Commands::Preview(args) => handle_preview(&args, &settings),
        Commands::Join(args) => handle_join(&args, &mut settings, &cli.settings),
        Commands::Clean(args) => handle_clean(&args, &settings),
        Commands::Recent(args) => handle_recent(&args, &mut settings, &cli.settings),
    }
}

fn handle_detect(args: &cli::DetectArgs) -> Result<()> {
    let (delimiter, encoding) = input_format(&args.input, &args.input_options)?;
    info!(
        "Detecting header in '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let grid = io_utils::read_grid_from_path(&args.input, delimiter, encoding)?;
    let scores = header::score_rows(&grid, args.rows);
    let detected = header::best_row(&scores).unwrap_or(header::EMPTY_GRID_HEADER_ROW);

    if args.json {
        let report = serde_json::json!({
            "input": args.input,
            "rows": grid.len(),
            "header_row": detected + 1,
            "scores": scores,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Serializing detection report")?
        );
    } else {
        let headers = vec!["row".to_string(), "score".to_string(), "preview".to_string()];
        let rows = scores
            .iter()
            .map(|score| {
                let marker = if score.row == detected { " *" } else { "" };
                vec![
                    format!("{}{marker}", score.row + 1),
                    format!("{:.3}", score.score),
                    grid[score.row]
                        .iter()
                        .map(|cell| cell.as_display())
                        .collect::<Vec<_>>()
                        .join(" | "),
                ]
            })
            .collect::<Vec<_>>();
        print!("{}", preview::render_table(&headers, &rows));
    }
    info!(
        "Detected header row {} of {} in {:?}",
        detected + 1,
        grid.len(),
        args.input
    );
    Ok(())
}

fn handle_preview(args: &cli::PreviewArgs, settings: &Settings) -> Result<()> {
    let sheet = load_sheet(&args.input, &args.input_options, args.header_row)?;
    let limit = args.rows.unwrap_or(settings.preview_rows);
    preview::print_preview(sheet.data(), limit);
    info!(
        "Displayed {} of {} row(s) from {:?} (header row {})",
        sheet.data().row_count().min(limit),
        sheet.data().row_count(),
        args.input,
        sheet.header_row() + 1
    );
    Ok(())
}

fn handle_join(args: &cli::JoinArgs, settings: &mut Settings, settings_path: &Path) -> Result<()> {
    let (_, encoding) = input_format(&args.main, &args.input_options)?;
    let mut loaded = Workspace::new();
    let mut paths = vec![args.main.clone()];
    paths.extend(args.lookups.iter().map(|l| l.path.clone()));
    for path in &paths {
        if loaded.workbooks().iter().any(|w| w.path() == path.as_path()) {
            continue;
        }
        loaded.load(path, args.input_options.delimiter, encoding)?;
        settings.record_recent(path);
    }
    for header in &args.headers {
        loaded
            .set_header(&SheetAddress::of_file(&header.path), header.choice)
            .with_context(|| format!("Applying header override for {:?}", header.path))?;
    }
    let pruned = settings.prune_missing();
    if pruned > 0 {
        debug!("Dropped {pruned} stale recent file(s)");
    }
    if let Err(err) = settings.save(settings_path) {
        warn!("Could not update recent files: {err:#}");
    }

    let request = JoinRequest {
        main: Some(SheetAddress::of_file(&args.main)),
        main_key: args.key.clone(),
        lookups: args
            .lookups
            .iter()
            .map(|lookup| LookupSelection {
                sheet: SheetAddress::of_file(&lookup.path),
                key: lookup.key.clone(),
            })
            .collect(),
        outputs: args
            .returns
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    };
    let spec = loaded.build_join_spec(&request)?;
    let available = join::joined_columns(&spec);
    for unknown in request.outputs.iter().filter(|name| !available.contains(name)) {
        warn!("Return column '{unknown}' will not be in the joined result");
    }

    let worker = join::spawn_join(spec).context("Starting join worker")?;
    let result = worker
        .wait(|percent| debug!("Join progress: {percent}%"))
        .map_err(|err| anyhow!("Join failed: {err}"))?;

    if args.table {
        preview::print_preview(&result, result.row_count());
        return Ok(());
    }
    let output = args.output.as_deref().map(|path| {
        if io_utils::is_dash(path) {
            path.to_path_buf()
        } else {
            match args.format {
                Some(format) if path.extension().is_none() => path.with_extension(format.extension()),
                _ => settings.output_path(path),
            }
        }
    });
    let fallback = args.format.unwrap_or(settings.default_save_format).delimiter();
    let delimiter = io_utils::resolve_output_delimiter(output.as_deref(), None, fallback);
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    io_utils::export_table(&result, output.as_deref(), delimiter, output_encoding)
}

fn handle_clean(args: &cli::CleanArgs, settings: &Settings) -> Result<()> {
    let mut sheet = load_sheet(&args.input, &args.input_options, args.header_row)?;
    let report = clean::clean_table(sheet.data_mut());
    info!(
        "Removed {} row(s) from {:?}",
        report.removed(),
        args.input
    );
    let output = args.output.as_deref().map(|path| {
        if io_utils::is_dash(path) {
            path.to_path_buf()
        } else {
            settings.output_path(path)
        }
    });
    let (input_delimiter, _) = input_format(&args.input, &args.input_options)?;
    let delimiter = io_utils::resolve_output_delimiter(output.as_deref(), None, input_delimiter);
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    io_utils::export_table(sheet.data(), output.as_deref(), delimiter, output_encoding)
}

fn handle_recent(args: &cli::RecentArgs, settings: &mut Settings, settings_path: &Path) -> Result<()> {
    if args.clear {
        settings.clear_recent();
        settings.save(settings_path)?;
        info!("Cleared recent files");
        return Ok(());
    }
    let pruned = settings.prune_missing();
    if pruned > 0 {
        info!("Dropped {pruned} recent file(s) that no longer exist");
        settings.save(settings_path)?;
    }
    if settings.recent_files.is_empty() {
        info!("No recent files");
        return Ok(());
    }
    let headers = vec!["#".to_string(), "path".to_string(), "opened".to_string()];
    let rows = settings
        .recent_files
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            vec![
                (idx + 1).to_string(),
                entry.path.display().to_string(),
                entry.opened_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]
        })
        .collect::<Vec<_>>();
    print!("{}", preview::render_table(&headers, &rows));
    Ok(())
}

fn input_format(
    path: &Path,
    options: &InputOptions,
) -> Result<(u8, &'static encoding_rs::Encoding)> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let encoding = io_utils::resolve_encoding(options.input_encoding.as_deref())?;
    Ok((delimiter, encoding))
}

fn load_sheet(path: &Path, options: &InputOptions, choice: HeaderChoice) -> Result<Sheet> {
    let (delimiter, encoding) = input_format(path, options)?;
    let workbook = Workbook::open(path, Some(delimiter), encoding)
        .with_context(|| format!("Loading {path:?}"))?;
    let mut sheet = workbook
        .sheets()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("{path:?} contains no sheets"))?;
    sheet.set_header(choice)?;
    Ok(sheet)
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
