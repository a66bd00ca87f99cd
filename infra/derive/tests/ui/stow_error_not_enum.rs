use stow_derive::stow_error;

#[stow_error]
pub struct DemoError {
    message: String,
}

fn main() {}
