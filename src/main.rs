//! aie-kernel-tests: host test harnesses for AIE micro-kernels

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use aie_kernel_tests::config::Config;
use aie_kernel_tests::harness::scenarios::{
    JoinTest, LocalMemTest, OddEvenTest, PlacedPipelineTest, VectorPlusOneTest, DEFAULT_CHUNK, DEFAULT_JOIN_LEN,
    DEFAULT_LEN, DEFAULT_LOCAL_MEM_LEN,
};
use aie_kernel_tests::harness::{run_scenario, Scenario, TestOptions};

#[derive(Parser)]
#[command(name = "aie-kernel-tests")]
#[command(about = "Run AIE kernel host tests against the emulated NPU")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Partition i + iter into odd and even outputs
    OddEven {
        #[command(flatten)]
        opts: HarnessArgs,
        #[arg(long, value_name = "N", default_value_t = DEFAULT_LEN)]
        len: usize,
    },
    /// Add one to every element on a single tile
    VectorPlusOne {
        #[command(flatten)]
        opts: HarnessArgs,
        #[arg(long, value_name = "N", default_value_t = DEFAULT_LEN)]
        len: usize,
    },
    /// Two chained plus-one tiles fed through an object FIFO
    #[command(alias = "xchess")]
    PlacedPipeline {
        #[command(flatten)]
        opts: HarnessArgs,
        #[arg(long, value_name = "N", default_value_t = DEFAULT_LEN)]
        len: usize,
        #[arg(long, value_name = "N", default_value_t = DEFAULT_CHUNK)]
        chunk: usize,
    },
    /// Nested-loop equality join
    Join {
        #[command(flatten)]
        opts: HarnessArgs,
        #[arg(long, value_name = "N", default_value_t = DEFAULT_JOIN_LEN)]
        len: usize,
    },
    /// Odd/even split inside one core, keeping input positions
    LocalMem {
        #[command(flatten)]
        opts: HarnessArgs,
        #[arg(long, value_name = "N", default_value_t = DEFAULT_LOCAL_MEM_LEN)]
        len: usize,
    },
    /// Print a sample configuration file
    SampleConfig,
}

#[derive(Args)]
struct HarnessArgs {
    /// xclbin container holding the kernel
    #[arg(short = 'x', long, value_name = "PATH")]
    xclbin: Option<PathBuf>,

    /// NPU instruction stream (binary, or .txt with one hex word per line)
    #[arg(short = 'i', long, value_name = "PATH")]
    instr: Option<PathBuf>,

    /// Kernel name prefix in the xclbin [default: MLIR_AIE]
    #[arg(short = 'k', long, value_name = "NAME")]
    kernel: Option<String>,

    /// Verbosity level
    #[arg(short = 'v', long, value_name = "LEVEL", default_value_t = 0)]
    verbosity: u8,

    /// Timed iterations
    #[arg(long, value_name = "N", default_value_t = 1)]
    iters: u32,

    /// Untimed, unverified iterations before the timed ones
    #[arg(long, value_name = "N", default_value_t = 0)]
    warmup: u32,

    /// Trace buffer size in bytes
    #[arg(long = "trace_sz", value_name = "BYTES", default_value_t = 0)]
    trace_sz: usize,

    /// Trace output file [default: trace.txt]
    #[arg(long = "trace_file", value_name = "PATH")]
    trace_file: Option<PathBuf>,

    /// Dump output buffers after every verified iteration
    #[arg(long)]
    print_buffers: bool,
}

impl HarnessArgs {
    /// Fill unset options from the config file and environment.
    fn into_options(self, config: &Config) -> TestOptions {
        TestOptions {
            xclbin: self.xclbin.or_else(|| config.xclbin()),
            instr: self.instr.or_else(|| config.instr()),
            kernel: self.kernel.unwrap_or_else(|| config.kernel()),
            verbosity: self.verbosity,
            iters: self.iters,
            warmup: self.warmup,
            trace_size: self.trace_sz,
            trace_file: self.trace_file.unwrap_or_else(|| config.trace_file()),
            print_buffers: self.print_buffers,
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let (scenario, args): (Box<dyn Scenario>, HarnessArgs) = match cli.command {
        Command::OddEven { opts, len } => (Box::new(OddEvenTest { len }), opts),
        Command::VectorPlusOne { opts, len } => (Box::new(VectorPlusOneTest { len }), opts),
        Command::PlacedPipeline { opts, len, chunk } => (Box::new(PlacedPipelineTest { len, chunk }), opts),
        Command::Join { opts, len } => (Box::new(JoinTest { len, ..JoinTest::default() }), opts),
        Command::LocalMem { opts, len } => (Box::new(LocalMemTest { len }), opts),
        Command::SampleConfig => {
            if let Some(path) = Config::user_config_path() {
                eprintln!("# user config location: {}", path.display());
            }
            print!("{}", Config::sample_config());
            return Ok(ExitCode::SUCCESS);
        }
    };

    init_logging(args.verbosity);
    let opts = args.into_options(Config::get());
    log::debug!("{} options: {:?}", scenario.name(), opts);

    let report = run_scenario(scenario.as_ref(), &opts)?;
    report.print();

    Ok(if report.passed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
