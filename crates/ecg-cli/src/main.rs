use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use ecg_lib::{
    classifier::{Classifier, EcgClassifier},
    config::Settings,
    detectors::OnsetDetector,
    features::{extract_features, extract_window_features},
    io::{
        chunks::{read_channel_file, read_channels},
        dataset::{DataLoader, EventRecord, EventRepository},
    },
    pipeline::analyze_waveform,
    plot::{figure_from_waveform, Figure, PlotBackend, Series},
    signal::Waveform,
    trainer::Trainer,
    EcgError,
};
use env_logger::Env;
use log::info;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use serde_json::json;
use std::{
    io,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "ecg",
    version,
    about = "ECG event classification and onset detection"
)]
struct Cli {
    /// Optional TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Dataset root (overrides DATA_PATH and the settings file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Model file or directory (overrides MODEL_PATH and the settings file)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Sampling rate in Hz (overrides SAMPLING_RATE and the settings file)
    #[arg(long, global = true)]
    sampling_rate: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the waveform comes from: a ch1,ch2 CSV file, a dataset event, or stdin.
#[derive(Args, Clone)]
struct InputArgs {
    #[arg(long, conflicts_with = "event")]
    input: Option<PathBuf>,
    #[arg(long)]
    event: Option<String>,
}

#[derive(Args, Clone, Copy)]
struct DetectorArgs {
    #[arg(long)]
    window_size: Option<usize>,
    #[arg(long)]
    threshold_factor: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the classifier on every labeled event and save the model
    Train,
    /// Classify a recording and locate its event onset
    Predict {
        #[command(flatten)]
        source: InputArgs,
        #[command(flatten)]
        detector: DetectorArgs,
    },
    /// Locate the event onset only (no model required)
    Detect {
        #[command(flatten)]
        source: InputArgs,
        #[command(flatten)]
        detector: DetectorArgs,
    },
    /// Print the feature vector, or one vector per window with --window-size
    Features {
        #[command(flatten)]
        source: InputArgs,
        #[arg(long)]
        window_size: Option<usize>,
    },
    /// Browse the dataset
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },
    /// Render both leads with the detected onset to a PNG
    Plot {
        #[command(flatten)]
        source: InputArgs,
        #[command(flatten)]
        detector: DetectorArgs,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 4000)]
        max_points: usize,
    },
}

#[derive(Subcommand)]
enum EventsCommand {
    /// One JSON line per loaded event
    List,
    /// Metadata, waveform and annotated onset for one event
    Show {
        #[arg(long)]
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let settings = resolve_settings(&cli)?;
    info!(
        "data_path={} model={} sampling_rate={}",
        settings.data_path.display(),
        settings.resolve_model_path().display(),
        settings.sampling_rate
    );

    match cli.command {
        Commands::Train => cmd_train(&settings)?,
        Commands::Predict { source, detector } => cmd_predict(&settings, &source, detector)?,
        Commands::Detect { source, detector } => cmd_detect(&settings, &source, detector)?,
        Commands::Features {
            source,
            window_size,
        } => cmd_features(&settings, &source, window_size)?,
        Commands::Events { command } => match command {
            EventsCommand::List => cmd_events_list(&settings)?,
            EventsCommand::Show { id } => cmd_events_show(&settings, &id)?,
        },
        Commands::Plot {
            source,
            detector,
            out,
            max_points,
        } => cmd_plot(&settings, &source, detector, &out, max_points)?,
    }
    Ok(())
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        settings.data_path = dir.clone();
    }
    if let Some(model) = &cli.model {
        settings.model_path = Some(model.clone());
    }
    if let Some(rate) = cli.sampling_rate {
        if rate == 0 {
            return Err(anyhow!("--sampling-rate must be positive"));
        }
        settings.sampling_rate = rate;
    }
    Ok(settings)
}

fn repository(settings: &Settings) -> EventRepository {
    EventRepository::new(DataLoader::new(
        settings.data_path.clone(),
        settings.sampling_rate,
    ))
}

fn detector(settings: &Settings, args: DetectorArgs) -> OnsetDetector {
    let mut detector = settings.detector;
    if let Some(window_size) = args.window_size {
        detector.window_size = window_size;
    }
    if let Some(factor) = args.threshold_factor {
        detector.threshold_factor = factor;
    }
    detector
}

fn load_waveform(settings: &Settings, source: &InputArgs) -> Result<Waveform> {
    if let Some(id) = &source.event {
        let mut repo = repository(settings);
        let record = find_event(&mut repo, id)?;
        return Ok(record.waveform.clone());
    }
    let pair = match &source.input {
        Some(path) => read_channel_file(path)?,
        None => read_channels(io::stdin().lock()).context("reading ch1,ch2 CSV from stdin")?,
    };
    Ok(Waveform::new(pair.ch1, pair.ch2, settings.sampling_rate)?)
}

fn find_event<'a>(repo: &'a mut EventRepository, id: &str) -> Result<&'a EventRecord> {
    repo.event_by_id(id)
        .ok_or_else(|| anyhow!("event not found: {}", id))
}

fn load_classifier(settings: &Settings) -> Result<EcgClassifier> {
    let path = settings.resolve_model_path();
    EcgClassifier::from_file(&path).map_err(|err| match err {
        err if err.is_unavailable() => {
            anyhow!("model unavailable ({}); run `ecg train` first", err)
        }
        err => err.into(),
    })
}

fn cmd_train(settings: &Settings) -> Result<()> {
    let path = settings.resolve_model_path();
    let mut trainer = Trainer::new(repository(settings), EcgClassifier::new());
    let summary = match trainer.train_and_save(&path) {
        Ok(summary) => summary,
        Err(EcgError::NoTrainingData) => {
            return Err(anyhow!(
                "no training data found under {}",
                settings.data_path.display()
            ))
        }
        Err(err) => return Err(err.into()),
    };
    let (mut repo, classifier) = trainer.into_parts();
    let skipped: Vec<_> = repo
        .skipped()
        .into_iter()
        .map(|(path, reason)| json!({ "path": path, "reason": reason }))
        .collect();
    info!("model classes: {:?}", classifier.classes().unwrap_or_default());
    let out = json!({
        "examples": summary.examples,
        "classes": summary.classes,
        "model_path": summary.model_path,
        "skipped": skipped,
    });
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_predict(settings: &Settings, source: &InputArgs, args: DetectorArgs) -> Result<()> {
    let classifier = load_classifier(settings)?;
    let waveform = load_waveform(settings, source)?;
    let analysis = analyze_waveform(&waveform, &classifier, &detector(settings, args))?;
    println!("{}", serde_json::to_string(&analysis)?);
    Ok(())
}

fn cmd_detect(settings: &Settings, source: &InputArgs, args: DetectorArgs) -> Result<()> {
    let waveform = load_waveform(settings, source)?;
    let result = detector(settings, args).detect(&waveform);
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn cmd_features(settings: &Settings, source: &InputArgs, window_size: Option<usize>) -> Result<()> {
    let waveform = load_waveform(settings, source)?;
    let out = match window_size {
        Some(size) => json!({ "windows": extract_window_features(&waveform, size) }),
        None => json!({ "features": extract_features(&waveform) }),
    };
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_events_list(settings: &Settings) -> Result<()> {
    let mut repo = repository(settings);
    for event in repo.events(false) {
        let row = json!({
            "event_id": event.event_id,
            "event_type": event.metadata.event_name,
            "is_approved": event.metadata.is_approved(),
            "patient_id": event.metadata.patient_id,
        });
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

fn cmd_events_show(settings: &Settings, id: &str) -> Result<()> {
    let mut repo = repository(settings);
    let event = find_event(&mut repo, id)?;
    let out = json!({
        "event_id": id,
        "metadata": {
            "patient_id": event.metadata.patient_id,
            "event_type": event.metadata.event_name,
            "event_time": event.metadata.event_time,
            "is_approved": event.metadata.is_approved(),
        },
        "ecg_data": {
            "ch1": event.waveform.channel1(),
            "ch2": event.waveform.channel2(),
            "sampling_rate": event.waveform.sampling_rate(),
        },
        "annotated_onset": event.annotated_onset,
    });
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_plot(
    settings: &Settings,
    source: &InputArgs,
    args: DetectorArgs,
    out: &Path,
    max_points: usize,
) -> Result<()> {
    let waveform = load_waveform(settings, source)?;
    let onset = detector(settings, args).detect(&waveform);
    let title = source.event.as_deref().unwrap_or("ECG");
    let fig = figure_from_waveform(title, &waveform, Some(&onset), max_points.max(2));
    PngBackend::new(out, (1200, 480)).draw(&fig)?;
    println!("{}", serde_json::to_string(&json!({ "out": out, "onset": onset }))?);
    Ok(())
}

/// Renders figures to PNG through plotters' bitmap backend.
struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path, size: (u32, u32)) -> Self {
        Self { path, size }
    }
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let (x_min, mut x_max, mut y_min, mut y_max) =
            fig.bounds().ok_or_else(|| anyhow!("figure has no data"))?;
        if x_max <= x_min {
            x_max = x_min + 1.0;
        }
        if y_max <= y_min {
            y_min -= 0.5;
            y_max += 0.5;
        }
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let (r, g, b) = line.style.color.rgb();
                    let color = RGBColor(r, g, b);
                    chart
                        .draw_series(LineSeries::new(
                            line.points.iter().map(|p| (p[0], p[1])),
                            color.stroke_width(line.style.width.round() as u32),
                        ))?
                        .label(line.name.clone())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                }
                Series::Marker(marker) => {
                    let (r, g, b) = marker.style.color.rgb();
                    let color = RGBColor(r, g, b);
                    let stroke = color.stroke_width(marker.style.width.round() as u32);
                    let points = [(marker.x, y_min), (marker.x, y_max)];
                    let anno = match marker.style.dash {
                        Some([on, off]) => chart.draw_series(DashedLineSeries::new(
                            points,
                            on.round().max(1.0) as u32,
                            off.round().max(1.0) as u32,
                            stroke,
                        ))?,
                        None => chart.draw_series(LineSeries::new(points, stroke))?,
                    };
                    anno.label(marker.name.clone())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                }
            }
        }
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }
}
