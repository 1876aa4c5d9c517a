pub const QUIT_COMMAND: &str = "/quit";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Empty,
    Quit,
}

/// Interpret one line typed by the user.
pub fn read(line: &str) -> Input {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim() == QUIT_COMMAND {
        return Input::Quit;
    }
    if line.trim().is_empty() {
        return Input::Empty;
    }
    Input::Send(line.to_string())
}
