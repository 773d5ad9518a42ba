//! Host-side console I/O for debug mode 2's interactive single-step prompt,
//! kept separate from the driving loop in `main.rs`.

use console::Term;

/// Block until the user presses Enter (or any key, on terminals that don't
/// support line input), then return. Used only between steps in debug mode
/// 2; the simulator itself has no notion of "paused".
pub fn wait_for_enter() {
    let term = Term::stdout();
    if term.read_line().is_err() {
        let _ = term.read_key();
    }
}
