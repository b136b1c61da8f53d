use std::fmt::Write;

use colored::Colorize;

use crate::runtime::RunState;
use crate::state::SP;

/// One line of instruction trace: PC, the three bytes from PC onwards, then every register.
///
/// `TRACE: 05 | 82 00 08 | 00 00 00 00 00 00 00 F4`
///
/// Bytes past the end of memory are shown as `--`.
pub fn trace_line(state: &RunState) -> String {
    let pc = state.pc();
    let mem = state.memory();
    let mut line = format!("TRACE: {:02X} |", pc);
    for offs in 0..3 {
        match mem.read(pc + offs) {
            Ok(byte) => write!(line, " {:02X}", byte),
            Err(_) => write!(line, " --"),
        }
        .expect("writing to a string cannot fail");
    }
    line.push_str(" |");
    for value in state.registers().as_slice() {
        write!(line, " {:02X}", value).expect("writing to a string cannot fail");
    }
    line
}

/// Register summary printed after a run.
///
/// Minimal output is plain `R<n> <value>` lines suited for blackbox tests.
pub fn format_registers(state: &RunState, minimal: bool) -> String {
    let reg = state.registers().as_slice();
    let mut out = String::new();

    if minimal {
        for (i, value) in reg.iter().enumerate() {
            out.push_str(&format!("R{} {}\n", i, value));
        }
        out.push_str(&format!("PC {}\n", state.pc()));
        return out;
    }

    out.push_str("\x1b[2m┌──────────────────────────┐\x1b[0m\n");
    out.push_str("\x1b[2m│       \x1b[3mhex   uint  binary\x1b[0m\x1b[2m │\x1b[0m\n");
    for (i, value) in reg.iter().enumerate() {
        let name = if i == SP as usize {
            format!("{}", "SP".bold())
        } else {
            format!("{}", format!("R{}", i).bold())
        };
        out.push_str(&format!(
            "\x1b[2m│\x1b[0m {}  0x{:02x}  {:>4}  {:08b} \x1b[2m│\x1b[0m\n",
            name, value, value, value
        ));
    }
    out.push_str(&format!(
        "\x1b[2m│\x1b[0m {}  0x{:02x}                 \x1b[2m│\x1b[0m\n",
        "PC".bold(),
        state.pc()
    ));
    out.push_str("\x1b[2m└──────────────────────────┘\x1b[0m\n");
    out
}

pub fn print_registers(state: &RunState, minimal: bool) {
    eprint!("{}", format_registers(state, minimal));
}
