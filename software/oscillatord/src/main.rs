use std::process::ExitCode;

use tracing::{debug, error, warn};

use oscillatord::controller::assemble;
use oscillatord::hootl::Bench;
use oscillatord::logging::{LoggingGuards, init_logging};
use oscillatord::pps::{PpsDevice, PpsSource};
use oscillatord::{Config, DaemonCtx, Error, Shutdown, engine, gnss, oscillator};

fn main() -> ExitCode {
    let logging = match init_logging() {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&logging) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(logging: &LoggingGuards) -> Result<(), Error> {
    let args: Vec<String> = std::env::args().collect();
    let [_, config_path] = args.as_slice() else {
        let program = args.first().map_or("oscillatord", String::as_str);
        return Err(Error::Usage(program.to_owned()));
    };

    let config = Config::from_file(config_path)?;
    let ctx = DaemonCtx::from_config(&config)?;
    if let Err(e) = logging.set_debug(ctx.debug) {
        warn!("{e}");
    }
    debug!("Configured turns: {}", ctx.turns);

    // The bench stands in for both the PPS device and the receiver
    let bench = if config.get_bool_default("hootl", false)? {
        Some(Bench::from_config(&config)?)
    } else {
        None
    };
    let (oscillator, bench_pps, bench_gnss) = match bench {
        Some(Bench {
            pps,
            oscillator,
            gnss,
        }) => (oscillator, Some(pps), Some(gnss)),
        None => (oscillator::from_config(&config)?, None, None),
    };

    let mut controller = assemble(
        ctx,
        oscillator,
        |ctx| match bench_pps {
            Some(pps) => Ok(pps),
            None => {
                let device = PpsDevice::open(&ctx.pps_device).map_err(Error::io("open"))?;
                Ok(Box::new(device) as Box<dyn PpsSource>)
            }
        },
        |ctx| engine::from_config_path(&ctx.libod_config_path),
        || match bench_gnss {
            Some(gnss) => Ok(gnss),
            None => gnss::from_config(&config),
        },
        Shutdown::install,
    )?;
    controller.run()
}
