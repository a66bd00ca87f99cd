use stow_derive::stow_error;

#[stow_error(code = Code)]
pub enum DemoError {
    #[code(NotFound)]
    #[code(Internal)]
    #[error("Missing: {key}")]
    Missing { key: String },
}

fn main() {}
