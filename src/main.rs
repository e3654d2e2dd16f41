use genrec::engine::{Engine, NullEngine};
use genrec::{param, run, store};
use log::{error, info};
use std::path::Path;
use std::process::exit;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: genrec <param.yaml>");
        exit(1);
    }
    let conf_info = args[1].clone();

    let param = match param::get(conf_info.clone()) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("Cannot read parameter file {}: {}", conf_info, e);
            exit(1);
        }
    };

    let logger = if param.general.log_base.is_empty() {
        flexi_logger::Logger::try_with_env_or_str(&param.general.log_level)
            .unwrap()
            .start()
    } else {
        flexi_logger::Logger::try_with_env_or_str(&param.general.log_level)
            .unwrap()
            .log_to_file(
                flexi_logger::FileSpec::default()
                    .basename(param.general.log_base.as_str())
                    .suffix(param.general.log_suffix.as_str()),
            )
            .start()
    };
    // the handle must stay alive for the duration of the run
    let _logger = match logger {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot initialize logging: {}", e);
            exit(1);
        }
    };

    info!("genrec {} starting at {}", env!("CARGO_PKG_VERSION"), chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));

    let data = match store::load_data(Path::new(&param.data.data_file)) {
        Ok(data) => data,
        Err(e) => {
            error!("Cannot load data file {}: {}", param.data.data_file, e);
            exit(1);
        }
    };
    info!("Data shape {:?}", data.dim());

    // The crate ships only the dry-run engine; real solvers plug in
    // through the library API.
    let engine: Box<dyn Engine> = match param.general.processor.as_str() {
        "dryrun" => Box::new(NullEngine),
        other => {
            error!(
                "No engine registered for processor '{}'. \
                Link one through genrec::engine::Engine, or use 'dryrun'.",
                other
            );
            exit(1);
        }
    };

    if let Err(e) = run(
        engine.as_ref(),
        param.ga.generations,
        &param.general.processor,
        &data,
        &conf_info,
        &param,
    ) {
        error!("Run aborted: {}", e);
        exit(1);
    }
}
