use clap::{ArgAction, Parser, Subcommand};
use log::debug;
use std::fmt;
use std::process::ExitCode;
use std::thread;
use stderrlog::LogLevelNum;
use sw_axi_core::config::{Config, DEFAULT_URI};
use sw_axi_core::resources::ram::Ram;
use sw_axi_core::{Bridge, Buffer, IpConfig, IpType, Master, SystemInfo};

const RAM_ADDRESS: u64 = 0x1000;
const RAM_SIZE: usize = 0x2000;
const GREETING: &[u8] = b"Hello world!";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Rendezvous point of the router.
    #[arg(short, long, env = "SW_AXI_URI", default_value = DEFAULT_URI)]
    uri: String,
    /// Name to introduce the bridge with. Defaults to the name of the bench.
    #[arg(short, long)]
    name: Option<String>,
    /// Log more. Can be repeated.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    bench: Bench,
}

#[derive(Subcommand, Debug, Copy, Clone)]
enum Bench {
    /// Connect to the router and print its identity.
    Version,
    /// Register a RAM slave, then print the peers and IP blocks known to the router.
    Handshake,
    /// Write a greeting to the RAM slave through a software master and read it back.
    MasterLite,
}

impl Bench {
    fn default_name(self) -> &'static str {
        match self {
            Bench::Version => "00-version",
            Bench::Handshake => "01-handshake",
            Bench::MasterLite => "02-sw-master-lite",
        }
    }
}

/// A bench step that went wrong.
enum Failed {
    Step {
        step: &'static str,
        error: sw_axi_core::Error,
    },
    Setup(&'static str),
}

impl fmt::Display for Failed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failed::Step { step, error } => write!(f, "{step}: {error}"),
            Failed::Setup(message) => f.write_str(message),
        }
    }
}

trait Step<T> {
    fn step(self, step: &'static str) -> Result<T, Failed>;
}

impl<T> Step<T> for sw_axi_core::Result<T> {
    fn step(self, step: &'static str) -> Result<T, Failed> {
        self.map_err(|error| Failed::Step { step, error })
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let verbosity = match args.verbose {
        0 => LogLevelNum::Warn,
        1 => LogLevelNum::Info,
        2 => LogLevelNum::Debug,
        _ => LogLevelNum::Trace,
    };
    if let Err(e) = stderrlog::new()
        .verbosity(verbosity)
        .modules([module_path!(), "sw_axi_core"])
        .init()
    {
        eprintln!("Unable to set up logging: {e}");
    }

    let config = Config {
        name: args
            .name
            .unwrap_or_else(|| args.bench.default_name().to_owned()),
        uri: args.uri,
    };
    debug!("Running {:?} with {:?}", args.bench, config);

    let mut bridge = Bridge::with_config(config);
    let result = match args.bench {
        Bench::Version => version(&mut bridge),
        Bench::Handshake => handshake(&mut bridge),
        Bench::MasterLite => master_lite(&mut bridge),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn connect(bridge: &mut Bridge) -> Result<(), Failed> {
    let router = bridge
        .connect_default()
        .step("Unable to connect to the router")?;
    print_router(&router);
    Ok(())
}

fn print_router(router: &SystemInfo) {
    eprintln!("Connected to the router:");
    eprintln!("Name:        {}", router.name);
    eprintln!("System Name: {}", router.system_name);
    eprintln!("Pid:         {}", router.pid);
    eprintln!("Hostname:    {}", router.hostname);
    eprintln!();
}

fn register_ram(bridge: &mut Bridge) -> Result<(), Failed> {
    let config =
        IpConfig::slave("Soft-RAM", RAM_ADDRESS, RAM_SIZE as u64).with_type(IpType::SlaveLite);
    let ram = Ram::new(RAM_ADDRESS, RAM_SIZE).ok_or(Failed::Setup("Unable to map the Soft-RAM"))?;
    bridge
        .register_slave(ram, config)
        .step("Unable to register the Soft-RAM slave")?;
    Ok(())
}

fn start(bridge: &mut Bridge) -> Result<(), Failed> {
    bridge.commit_ip().step("Unable to commit the IP")?;
    bridge.start().step("Unable to start the bridge")?;

    eprintln!("Peers:");
    for peer in bridge.peers().step("Unable to enumerate peers")? {
        eprintln!("{peer}");
    }
    eprintln!();

    let ip_blocks = bridge.ip_blocks().step("Unable to enumerate the IPs")?;
    if ip_blocks.is_empty() {
        eprintln!("No IP blocks registered");
    } else {
        eprintln!("IP blocks:");
    }
    for ip in ip_blocks {
        eprintln!("{ip}");
    }
    Ok(())
}

fn disconnect(bridge: &mut Bridge) {
    eprintln!("Disconnecting");
    bridge.disconnect();
}

fn version(bridge: &mut Bridge) -> Result<bool, Failed> {
    connect(bridge)?;
    disconnect(bridge);
    Ok(true)
}

fn handshake(bridge: &mut Bridge) -> Result<bool, Failed> {
    connect(bridge)?;
    register_ram(bridge)?;
    start(bridge)?;
    disconnect(bridge);
    Ok(true)
}

fn master_lite(bridge: &mut Bridge) -> Result<bool, Failed> {
    connect(bridge)?;
    register_ram(bridge)?;
    let master = bridge
        .register_master_ip(IpConfig::master("Soft-Master").with_type(IpType::MasterLite))
        .step("Unable to register a master IP")?;
    start(bridge)?;

    let matched = alongside(bridge, move || exercise(&master))?;
    disconnect(bridge);
    Ok(matched)
}

/// Run `work` on its own thread until the bridge stops, then report what `work` returned.
///
/// `work` is joined even if the bridge stopped with an error.
fn alongside(
    bridge: &mut Bridge,
    work: impl FnOnce() -> bool + Send + 'static,
) -> Result<bool, Failed> {
    let worker = thread::Builder::new()
        .name("soft-master".into())
        .spawn(work)
        .map_err(|_| Failed::Setup("Unable to start the master"))?;

    let completed = bridge.wait_for_completion();
    let matched = worker.join().unwrap_or(false);
    completed.step("Failed to complete without errors")?;
    Ok(matched)
}

/// Write the greeting, read it back, and report whether both agree. Terminates the master.
fn exercise(master: &Master) -> bool {
    let written = master.write(&Buffer::new(RAM_ADDRESS, GREETING.to_vec()));
    let read = master.read(Buffer::zeroed(RAM_ADDRESS, GREETING.len()));

    let outcome = written
        .wait()
        .step("Write failed")
        .and_then(|()| read.wait().step("Read failed"));
    let matched = match outcome {
        Ok(read) => {
            println!("Wrote: {}", String::from_utf8_lossy(GREETING));
            println!("Read:  {}", String::from_utf8_lossy(&read.data));
            let matched = read.data == GREETING;
            println!("{}", if matched { "MATCH!" } else { "NO MATCH!" });
            matched
        }
        Err(e) => {
            eprintln!("{e}");
            false
        }
    };

    eprintln!("Terminating the master");
    master.terminate();
    matched
}
