use pybridge::{
    init_dev_logging, init_logging, synthetic_fleet, top_pods, Config, EmbeddedRuntime, LogConfig, Scorer,
    SymbolRef,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug)]
struct Options {
    config: Option<PathBuf>,
    module: Option<String>,
    attribute: Option<String>,
    python_path: Vec<String>,
    pods: usize,
    adapters: usize,
    json: bool,
    timeout_ms: Option<u64>,
    top: usize,
    init: bool,
    verbose: bool,
}

impl Options {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let prog = args.first().map(String::as_str).unwrap_or("pybridge");

        let mut options = Options {
            config: None,
            module: None,
            attribute: None,
            python_path: Vec::new(),
            pods: 8,
            adapters: 2,
            json: false,
            timeout_ms: None,
            top: 3,
            init: false,
            verbose: false,
        };

        let mut rest = args.iter().skip(1);
        while let Some(arg) = rest.next() {
            let mut value = |name: &str| {
                rest.next()
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {}\n\n{}", name, Self::usage(prog)))
            };

            match arg.as_str() {
                "--help" | "-h" => return Err(Self::usage(prog)),
                "--config" => options.config = Some(PathBuf::from(value("--config")?)),
                "--module" => options.module = Some(value("--module")?),
                "--attr" => options.attribute = Some(value("--attr")?),
                "--python-path" => options.python_path.push(value("--python-path")?),
                "--pods" => options.pods = parse_number("--pods", &value("--pods")?)?,
                "--adapters" => options.adapters = parse_number("--adapters", &value("--adapters")?)?,
                "--timeout-ms" => options.timeout_ms = Some(parse_number("--timeout-ms", &value("--timeout-ms")?)?),
                "--top" => options.top = parse_number("--top", &value("--top")?)?,
                "--json" => options.json = true,
                "--init" => options.init = true,
                "-v" | "--verbose" => options.verbose = true,
                opt => return Err(format!("Unknown option: {}\n\n{}", opt, Self::usage(prog))),
            }
        }

        Ok(options)
    }

    fn usage(prog: &str) -> String {
        format!(
            "pybridge - score pods with an embedded Python callable\n\n\
            USAGE:\n    {} [OPTIONS]\n\n\
            OPTIONS:\n    \
            -h, --help             Print help information\n    \
            --config <path>        Load configuration from this file\n    \
            --module <name>        Python module holding the scorer\n    \
            --attr <name>          Callable to invoke on the module\n    \
            --python-path <dir>    Prepend a directory to sys.path (repeatable)\n    \
            --pods <n>             Number of synthetic pods [default: 8]\n    \
            --adapters <n>         Adapters per pod [default: 2]\n    \
            --json                 Pass the batch as JSON bytes\n    \
            --timeout-ms <n>       Abandon the call after n milliseconds\n    \
            --top <n>              Number of pods to print [default: 3]\n    \
            --init                 Print a default configuration file\n    \
            -v, --verbose          Enable debug logging\n\n\
            EXAMPLES:\n    \
            {} --pods 1000\n    \
            {} --json --python-path ./python\n    \
            {} --module my_scorer --attr rank --timeout-ms 250",
            prog, prog, prog, prog
        )
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("Invalid value for {}: {}", name, raw))
}

fn load_config(options: &Options) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    };

    if let Some(module) = &options.module {
        config.scorer.module = module.clone();
    }
    if let Some(attribute) = &options.attribute {
        config.scorer.attribute = attribute.clone();
    }
    if let Some(timeout_ms) = options.timeout_ms {
        config.scorer.timeout_ms = timeout_ms;
    }
    config.runtime.python_path.extend(options.python_path.iter().cloned());

    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = match Options::from_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if options.init {
        print!("{}", Config::generate_default());
        return Ok(());
    }

    let config = load_config(&options)?;

    let _guard = if options.verbose {
        init_dev_logging()
    } else {
        init_logging(LogConfig::from(&config.logging))
    };

    info!(symbol = %config.scorer.symbol(), "pybridge starting");
    debug!(?options, "Configuration loaded");

    let runtime = EmbeddedRuntime::global();
    if let Err(e) = runtime.configure(&config.runtime) {
        error!(error = %e, "Failed to configure the embedded runtime");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let scorer = Scorer::from_config(&config.scorer);
    let fleet = synthetic_fleet(options.pods, options.adapters);
    let target: SymbolRef = if options.json {
        config.scorer.json_symbol()
    } else {
        scorer.symbol().clone()
    };

    let started = Instant::now();
    let outcome = if options.json {
        scorer.score_json_within(&fleet, config.scorer.timeout_ms)
    } else {
        scorer.score_within(&fleet, config.scorer.timeout_ms)
    };
    let elapsed = started.elapsed();

    let scores = match outcome {
        Ok(scores) => scores,
        Err(e) => {
            error!(symbol = %target, error = %e, "Scoring failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!(symbol = %target, pods = fleet.len(), ?elapsed, "Scoring complete");
    println!("Scored {} pods with {} in {:?}", fleet.len(), target, elapsed);
    for (rank, pod) in top_pods(scores, options.top).iter().enumerate() {
        println!("{:>3}. {:<12} {}", rank + 1, pod.pod_name, pod.score);
    }

    Ok(())
}
