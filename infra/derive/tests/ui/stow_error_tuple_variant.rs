use stow_derive::stow_error;

#[stow_error]
pub enum DemoError {
    Io(std::io::Error),
}

fn main() {}
