use anyhow::{Context, Result};
use drivergcn::cli::{parse_args, setup_logging, BuildArgs, Commands, OutputFormat, PredictArgs, TrainArgs};
use drivergcn::data::loader::TableLoader;
use drivergcn::data::mapping::GeneMapping;
use drivergcn::model::GcnConfig;
use drivergcn::predict::predictor::{utils as predict_utils, Predictor};
use drivergcn::training::{trainer::Trainer, TrainingConfig};
use drivergcn::{DefaultBackend, TrainBackend};
use tracing::{error, info, warn};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", drivergcn::info());

    let result = match cli.command {
        Commands::Build(args) => run_build(args),
        Commands::Train(args) => run_train(args),
        Commands::Predict(args) => run_predict(args),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    info!("Building {} gene graph from {:?}", args.data.cancer, args.data.data_dir);

    let graph = drivergcn::prepare_graph(&args.data.paths(), args.data.assembler_config())
        .context("Failed to assemble gene graph")?;

    graph.mapping.save_json(&args.mapping_out)?;

    if let Some(plot) = &args.graph_plot {
        drivergcn::viz::render_graph(plot, &graph, None)
            .with_context(|| format!("Failed to draw graph to {:?}", plot))?;
    }

    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    info!("Starting training...");
    info!("Output directory: {:?}", args.output);

    let mut training_config = match &args.config {
        Some(path) => TrainingConfig::load(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        training_config.epochs = epochs;
    }
    if let Some(learning_rate) = args.learning_rate {
        training_config.learning_rate = learning_rate;
    }
    if let Some(seed) = args.seed {
        training_config.seed = seed;
    }
    if let Some(log_every) = args.log_every {
        training_config.log_every = log_every;
    }
    if let Some(snapshot_every) = args.snapshot_every {
        training_config.snapshot_every = snapshot_every;
    }
    if let Some(checkpoint_every) = args.checkpoint_every {
        training_config.checkpoint_frequency = checkpoint_every;
    }
    if args.no_progress {
        training_config.show_progress = false;
    }

    let assembler_config = args.data.assembler_config();
    let graph = drivergcn::prepare_graph(&args.data.paths(), assembler_config)
        .context("Failed to assemble gene graph")?;

    let device = Default::default();
    let snapshot_every = training_config.snapshot_every;
    let mut trainer = Trainer::<TrainBackend>::new(training_config, GcnConfig::new(), device)
        .with_assembler_config(assembler_config)
        .with_output_dir(&args.output)?;

    if snapshot_every > 0 {
        trainer = trainer.with_snapshot_dir(args.output.join("snapshots"))?;
    }

    let (_, result) = trainer.train(&graph).context("Training failed")?;

    info!("=== Training Results ===");
    info!("Total epochs: {}", result.state.epoch);
    info!("Best loss: {:.4}", result.state.best_loss);
    info!("Training time: {}", drivergcn::utils::format_duration(result.duration_secs));
    info!("Final metrics on labeled genes:");
    info!("  Loss: {:.4}", result.final_metrics.loss);
    info!("  Accuracy: {:.4}", result.final_metrics.accuracy);
    info!("  Precision: {:.4}", result.final_metrics.precision);
    info!("  Recall: {:.4}", result.final_metrics.recall);
    info!("  F1: {:.4}", result.final_metrics.f1);

    if let Some(path) = &result.model_path {
        info!("Model saved to: {:?}", path);
    }

    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    info!("Starting prediction...");
    info!("Model: {:?}", args.model);
    info!("Output file: {:?}", args.output);

    let device = Default::default();

    info!("Loading model...");
    let mut predictor = Predictor::<DefaultBackend>::from_checkpoint(&args.model, device)
        .with_context(|| format!("Failed to load model from {:?}", args.model))?;

    let assembler_config = args.data.assembler_config();
    if let Some(trained) = predictor.metadata().map(|m| m.assembler) {
        let differs = trained.max_links != assembler_config.max_links
            || trained.undirected != assembler_config.undirected;
        if differs {
            warn!(
                "Graph settings differ from training (trained with max_links={}, undirected={})",
                trained.max_links, trained.undirected
            );
        }
        if trained.standardize != assembler_config.standardize {
            info!("Feature standardization follows the model (standardize={})", trained.standardize);
        }
    }

    if let Some(mapping_path) = &args.mapping {
        predictor = predictor.with_mapping(GeneMapping::load_json(mapping_path)?);
    }

    let tables = TableLoader::new().load_tables(&args.data.paths())?;
    let graph = predictor
        .graph_assembler(assembler_config)
        .assemble(&tables)
        .context("Failed to assemble gene graph")?;

    info!("Running prediction...");
    let predictions = predictor.predict(&graph).context("Prediction failed")?;

    predictions.summary.print();
    if args.top > 0 {
        info!("Top predicted drivers:");
        for (rank, pred) in predictions.top_drivers(args.top).iter().enumerate() {
            info!(
                "  {:>3}. {} (p={:.4}, known: {})",
                rank + 1,
                pred.gene_id,
                pred.driver_probability,
                pred.known_label
            );
        }
    }

    match args.format {
        OutputFormat::Csv => predict_utils::save_predictions_to_csv(&predictions, &args.output)?,
        OutputFormat::Json => predict_utils::save_predictions_to_json(&predictions, &args.output)?,
    }

    info!("Predictions saved to: {:?}", args.output);

    Ok(())
}
