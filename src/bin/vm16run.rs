// Host binary: loads a program into a VM16 instance and runs it, printing
// each event the dispatcher yields on. Grounded in
// `CharlyCst-miralis/runner/src/main.rs`'s derive(Parser) CLI surface;
// env_logger is wired here, at the binary edge, so the library itself never
// forces a particular logging backend on an embedder.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use vm16::{RunStatus, Vm};

/// Run a VM16 program from the command line.
#[derive(Parser, Debug)]
#[command(name = "vm16run", version, about)]
struct Args {
    /// Path to the program image: H16 text, or raw binary words with --binary.
    program: String,

    /// Memory size index: window is `64 << size_index` words.
    #[arg(long, default_value_t = 4)]
    size_index: u8,

    /// Treat `program` as a raw binary word dump instead of H16 text.
    #[arg(long)]
    binary: bool,

    /// Program counter to start execution at.
    #[arg(long, default_value_t = 0)]
    pc: u16,

    /// Machine cycles to run per dispatch before reporting status.
    #[arg(long, default_value_t = 1_000_000)]
    cycles: u32,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut vm = Vm::new(args.size_index);

    let load_result = if args.binary {
        load_binary(&mut vm, &args.program)
    } else {
        load_h16(&mut vm, &args.program)
    };
    if let Err(e) = load_result {
        eprintln!("vm16run: {}", e);
        return ExitCode::FAILURE;
    }

    vm.set_pc(args.pc);

    loop {
        let (status, executed) = vm.run(args.cycles);
        log::info!("ran {} cycle(s), status {:?}", executed, status);
        match status {
            RunStatus::Ok => continue,
            RunStatus::Nop => continue,
            RunStatus::In => {
                println!("IN  port={:#06x} -> 0 (no host wired up)", vm.l_addr());
                vm.write_input(0);
            }
            RunStatus::Out => {
                println!("OUT port={:#06x} data={:#06x}", vm.l_addr(), vm.l_data());
            }
            RunStatus::Sys => {
                println!("SYS call={:#06x}", vm.l_addr());
            }
            RunStatus::Break => {
                println!("BRK at pc={:#06x}", vm.get_pc());
                break;
            }
            RunStatus::Halt => {
                println!("HALT at pc={:#06x}", vm.get_pc());
                break;
            }
            RunStatus::Error => {
                eprintln!("vm16run: invalid opcode at pc={:#06x}", vm.get_pc());
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn load_h16(vm: &mut Vm, path: &str) -> Result<(), String> {
    let text = fs::read_to_string(path).map_err(|e| format!("reading {}: {}", path, e))?;
    vm.load_h16(&text).map_err(|e| format!("parsing {}: {}", path, e))
}

fn load_binary(vm: &mut Vm, path: &str) -> Result<(), String> {
    let bytes = fs::read(path).map_err(|e| format!("reading {}: {}", path, e))?;
    let words: Vec<u16> = bytes
        .chunks(2)
        .map(|c| u16::from_le_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .collect();
    let n = words.len().min(vm.mem_size());
    vm.write_mem(0, n as u16, &words[..n]);
    Ok(())
}
