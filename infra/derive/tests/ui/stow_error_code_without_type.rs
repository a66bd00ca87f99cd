use stow_derive::stow_error;

#[stow_error]
pub enum DemoError {
    #[code(Internal)]
    #[error("Internal: {message}")]
    Internal { message: String },
}

fn main() {}
