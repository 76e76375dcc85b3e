/// dynlink - call-site linking demo CLI
use dynlink::*;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("dynlink v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    dynlink [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help               Print this help message");
    eprintln!("    -V, --version            Print version information");
    eprintln!("    -c, --config <FILE>      Load linker configuration from a TOML file");
    eprintln!("    -s, --scenario <NAME>    color | polymorphic | megamorphic (default: color)");
    eprintln!("    -n, --iterations <N>     Calls per scenario (default: 1000)");
    eprintln!("    -v, --verbose            Log relinks (repeat for trace output)");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    dynlink --scenario polymorphic -n 10000");
    eprintln!("    dynlink --config dynlink.toml --scenario megamorphic -v");
}

fn print_version() {
    println!("dynlink {}", VERSION);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scenario {
    Color,
    Polymorphic,
    Megamorphic,
}

struct Options {
    config: Option<PathBuf>,
    scenario: Scenario,
    iterations: usize,
    verbosity: u8,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut config = None;
    let mut scenario = Scenario::Color;
    let mut iterations = 1000;
    let mut verbosity = 0;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).ok_or("Missing file after --config")?;
                config = Some(PathBuf::from(path));
            }
            "-s" | "--scenario" => {
                i += 1;
                scenario = match args.get(i).map(String::as_str) {
                    Some("color") => Scenario::Color,
                    Some("polymorphic") => Scenario::Polymorphic,
                    Some("megamorphic") => Scenario::Megamorphic,
                    Some(other) => return Err(format!("Unknown scenario: {}", other)),
                    None => return Err("Missing name after --scenario".to_string()),
                };
            }
            "-n" | "--iterations" => {
                i += 1;
                let n = args.get(i).ok_or("Missing count after --iterations")?;
                iterations = n
                    .parse()
                    .map_err(|_| format!("Invalid iteration count: {}", n))?;
            }
            "-v" | "--verbose" => verbosity += 1,
            "-vv" => verbosity += 2,
            arg => return Err(format!("Unknown option: {}", arg)),
        }
        i += 1;
    }

    Ok(Options {
        config,
        scenario,
        iterations,
        verbosity,
    })
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Receivers of distinct types that all answer `GET:PROPERTY|ELEMENT:color`
fn color_receivers() -> Vec<Value> {
    let red = ClassBuilder::new("Red")
        .field("color", Value::str("red"))
        .build();
    let green = ClassBuilder::new("Green")
        .method("getColor", 0, |_, _| Ok(Value::str("green")))
        .build();
    vec![
        Value::object(Instance::new(&red)),
        Value::object(Instance::new(&green)),
        Value::map([("color", Value::str("blue"))]),
    ]
}

/// `count` unrelated classes, each with a public `color` field
fn class_receivers(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let class = ClassBuilder::new(&format!("Shape{}", i))
                .field("color", Value::str(format!("shade-{}", i)))
                .build();
            Value::object(Instance::new(&class))
        })
        .collect()
}

/// The megamorphic scenario always parks its site once the chain overflows
fn scenario_config(scenario: Scenario, config: LinkerConfig) -> LinkerConfig {
    match scenario {
        Scenario::Megamorphic => config
            .with_site_policy(SiteKind::Chained)
            .with_eviction(EvictionPolicy::Megamorphic),
        Scenario::Color | Scenario::Polymorphic => config,
    }
}

/// Drive site 0 of a fresh code unit through `iterations` calls
fn run_scenario(
    scenario: Scenario,
    config: &LinkerConfig,
    iterations: usize,
) -> Result<(CodeUnit, usize), String> {
    let linker: Arc<DynamicLinker> = DynamicLinkerFactory::from_config(config)
        .build()
        .map_err(|e| e.to_string())?;

    let receivers = match scenario {
        Scenario::Color => color_receivers(),
        Scenario::Polymorphic => class_receivers(config.max_chain_length.min(4)),
        Scenario::Megamorphic => class_receivers(config.max_chain_length * 2 + 1),
    };

    let unit = CodeUnit::new(linker, "dynlink-cli");
    let op = Operation::get()
        .with_namespaces(&[StandardNamespace::Property, StandardNamespace::Element])
        .named("color");
    let shape = MethodShape::generic(1);

    for i in 0..iterations {
        let receiver = &receivers[i % receivers.len()];
        unit.invoke(0, &op, &shape, std::slice::from_ref(receiver))
            .map_err(|e| e.to_string())?;
    }
    Ok((unit, receivers.len()))
}

fn run(options: &Options) -> Result<(), String> {
    let config = match &options.config {
        Some(path) => LinkerConfig::load(path).map_err(|e| e.to_string())?,
        None => LinkerConfig::default(),
    };
    let config = scenario_config(options.scenario, config);
    let (unit, receiver_types) = run_scenario(options.scenario, &config, options.iterations)?;

    println!("scenario: {:?}", options.scenario);
    println!("receiver types: {}", receiver_types);
    println!("calls: {}", options.iterations);
    for (index, stats) in unit.stats() {
        println!("site {}:", index);
        println!("  state:                  {:?}", stats.state);
        println!("  chain length:           {}", stats.chain_length);
        println!("  hits:                   {}", stats.hits);
        println!("  misses:                 {}", stats.misses);
        println!("  relinks:                {}", stats.relinks);
        println!("  megamorphic dispatches: {}", stats.megamorphic_dispatches);
        println!("  hit rate:               {:.2}%", stats.hit_rate * 100.0);
    }
    Ok(())
}

fn main() {
    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    init_logging(options.verbosity);

    if let Err(e) = run(&options) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_state(scenario: Scenario, config: LinkerConfig) -> LinkState {
        let config = scenario_config(scenario, config);
        let (unit, _) = run_scenario(scenario, &config, 100).unwrap();
        unit.stats()[0].1.state
    }

    #[test]
    fn test_megamorphic_scenario_without_config_file() {
        assert_eq!(
            site_state(Scenario::Megamorphic, LinkerConfig::default()),
            LinkState::Megamorphic
        );
    }

    #[test]
    fn test_megamorphic_scenario_overrides_fifo_config() {
        let config = LinkerConfig::default()
            .with_max_chain_length(2)
            .with_eviction(EvictionPolicy::Fifo);
        assert_eq!(
            site_state(Scenario::Megamorphic, config),
            LinkState::Megamorphic
        );
    }

    #[test]
    fn test_color_scenario_stays_linked() {
        assert_eq!(
            site_state(Scenario::Color, LinkerConfig::default()),
            LinkState::Linked
        );
    }
}
