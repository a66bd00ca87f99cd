use stow_derive::stow_error;

#[stow_error(code = Code)]
pub enum DemoError {
    #[code(source)]
    #[error("Internal: {message}")]
    Internal { message: String },
}

fn main() {}
