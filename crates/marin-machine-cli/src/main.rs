#![forbid(unsafe_code)]

mod native {
    use std::fs::File;
    use std::io::{self, BufWriter, Write};
    use std::path::PathBuf;

    use anyhow::{Context, Result};
    use clap::Parser;
    use marin_machine::{Machine, MachineConfig};
    use marin_timers::TimerMode;
    use tracing_subscriber::EnvFilter;

    /// Guest time advanced per loop iteration.
    const SLICE_NS: u64 = 1_000_000;

    #[derive(Debug, Parser)]
    #[command(about = "Assembles a Marin board, boots it and drives its peripherals")]
    pub struct Args {
        /// CPU model (e.g. `MoxieLite` or `MoxieLite-moxie-cpu`).
        #[arg(long)]
        cpu: Option<String>,

        /// External RAM size in MiB.
        #[arg(long, default_value_t = 128)]
        ram: u64,

        /// ELF kernel image. Without one the CPU starts at the ROM base.
        #[arg(long)]
        kernel: Option<PathBuf>,

        /// Kernel command line (recorded only).
        #[arg(long)]
        append: Option<String>,

        /// Initial ram disk, placed on the first page after the kernel.
        #[arg(long, requires = "kernel")]
        initrd: Option<PathBuf>,

        /// File whose bytes are queued as serial input.
        #[arg(long)]
        serial_in: Option<PathBuf>,

        /// Where to write serial output bytes (`stdout` or a file path).
        #[arg(long, default_value = "stdout")]
        serial_out: String,

        /// Guest nanoseconds to advance the timer by.
        #[arg(long, default_value_t = 0)]
        run_ns: u64,

        /// Run the timer periodically with this many 50 MHz ticks per expiry.
        #[arg(long)]
        timer_limit: Option<u64>,

        /// Write the device snapshot here on exit.
        #[arg(long)]
        snapshot_save: Option<PathBuf>,
    }

    pub fn main() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();

        let args = Args::parse();

        let ram_size = args
            .ram
            .checked_mul(1024 * 1024)
            .context("RAM size overflow")?;

        let mut machine = Machine::new(MachineConfig {
            cpu_model: args.cpu.clone(),
            ram_size,
            kernel: args.kernel.clone(),
            kernel_cmdline: args.append.clone(),
            initrd: args.initrd.clone(),
            ..MachineConfig::default()
        })?;

        if let Some(path) = &args.serial_in {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read serial input: {}", path.display()))?;
            machine.serial_input(&bytes);
        }

        if let Some(limit) = args.timer_limit {
            let mut timer = machine.timer_mut();
            timer.set_limit(limit, true, 0);
            timer.run(TimerMode::Periodic, 0);
        }

        let mut serial_sink = open_serial_sink(&args.serial_out)?;

        let mut now_ns = 0u64;
        let mut expiries = 0u64;
        while now_ns < args.run_ns {
            now_ns = now_ns.saturating_add(SLICE_NS).min(args.run_ns);
            expiries += machine.advance_time(now_ns);
            stream_serial(&mut machine, &mut serial_sink)?;
        }
        stream_serial(&mut machine, &mut serial_sink)?;
        serial_sink.flush()?;

        if let Some(path) = &args.snapshot_save {
            std::fs::write(path, machine.save_device_state()).with_context(|| {
                format!("failed to write snapshot: {}", path.display())
            })?;
        }

        print_summary(&machine, now_ns, expiries);
        Ok(())
    }

    fn open_serial_sink(serial_out: &str) -> Result<Box<dyn Write>> {
        if serial_out == "stdout" {
            return Ok(Box::new(io::stdout()));
        }
        let f = File::create(serial_out)
            .with_context(|| format!("failed to create serial output file: {serial_out}"))?;
        Ok(Box::new(BufWriter::new(f)))
    }

    fn stream_serial(machine: &mut Machine, out: &mut dyn Write) -> Result<()> {
        let bytes = machine.take_serial_output();
        if !bytes.is_empty() {
            out.write_all(&bytes)?;
        }
        Ok(())
    }

    fn print_summary(machine: &Machine, now_ns: u64, expiries: u64) {
        eprintln!("cpu: {}", machine.cpu().model());
        for region in machine.regions() {
            eprintln!(
                "  {:#010x}..{:#010x} {:?} {}",
                region.start,
                region.start + region.len,
                region.kind,
                region.name
            );
        }
        if let Some(info) = machine.boot_info() {
            eprintln!(
                "kernel: {:#010x}..{:#010x} entry {:#010x}",
                info.kernel_low, info.kernel_high, info.entry
            );
            if let Some(initrd) = info.initrd {
                eprintln!("initrd: {:#010x} ({} bytes)", initrd.offset, initrd.size);
            }
        }
        eprintln!("bootstrap pc: {:#010x}", machine.bootstrap_pc());
        eprintln!("timer: {expiries} expiries in {now_ns} ns");
        if machine.pending_serial_input() > 0 {
            eprintln!(
                "serial: {} input bytes not yet consumed",
                machine.pending_serial_input()
            );
        }
    }
}

fn main() -> anyhow::Result<()> {
    native::main()
}
