mod args;
mod rules;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};

use mvtiler::config::Config;
use mvtiler::container::{DirectorySink, MbtilesSink, TileSink};
use mvtiler::emitter::Emitter;
use mvtiler::pbf::PbfSource;
use mvtiler::pipeline::Pipeline;
use rules::RuleProcessor;

fn run(args: args::Args) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let layers = config.layer_set()?;
    for (name, _) in config.source_layers() {
        warn!("layer {name:?} names an external source; this build reads cached geometries only through the library API");
    }

    let processor = RuleProcessor::load(&args.process)?;
    let mut pipeline = Pipeline::new(&layers, config.settings.basezoom, processor);
    pipeline.init()?;

    for input in &args.inputs {
        info!("Reading {}", input.display());
        let mut source = PbfSource::open(input)
            .with_context(|| format!("cannot open {}", input.display()))?;
        pipeline.ingest(&mut source)?;
    }

    let output_name = args.output.to_string_lossy();
    let sqlite = output_name.ends_with(".mbtiles") || output_name.ends_with(".sqlite");
    let mut sink: Box<dyn TileSink> = if sqlite {
        let mut sink = MbtilesSink::open(&args.output)
            .with_context(|| format!("cannot open {}", args.output.display()))?;
        sink.put_metadata("name", &config.settings.name)?;
        sink.put_metadata("type", "baselayer")?;
        sink.put_metadata("version", &config.settings.version)?;
        sink.put_metadata("description", &config.settings.description)?;
        sink.put_metadata("format", "pbf")?;
        for (key, value) in &config.settings.metadata {
            match value.as_str() {
                Some(text) => sink.put_metadata(key, text)?,
                None => sink.put_metadata(key, &value.to_string())?,
            }
        }
        Box::new(sink)
    } else {
        Box::new(DirectorySink::new(args.output.clone())?)
    };

    let mut base_index = std::mem::take(&mut pipeline.tile_index);
    let mut stats = pipeline.stats;
    let emitter = Emitter {
        store: &pipeline.store,
        cached: pipeline.cached_geometries(),
        layers: &layers,
        basezoom: config.settings.basezoom,
        start_zoom: config.settings.minzoom,
        end_zoom: config.settings.maxzoom,
        include_ids: config.settings.include_ids,
        compression: config.compression(),
        bounding_box: config.settings.bounding_box,
        verbose: args.verbose,
    };
    emitter.write_tiles(&mut base_index, sink.as_mut(), &mut stats)?;

    pipeline.finish()?;
    info!("Tileset written to {}", args.output.display());
    println!("{stats}");
    Ok(())
}

fn main() {
    let args = args::Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .format_module_path(false)
        .format_timestamp(None)
        .init();

    if let Err(e) = run(args) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
