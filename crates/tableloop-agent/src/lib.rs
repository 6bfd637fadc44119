mod command;
pub mod fence;
mod http;
mod output;
mod spawner;
mod traits;

pub use command::CommandGenerator;
pub use fence::extract_code;
pub use http::HttpGenerator;
pub use output::ProcessOutput;
pub use spawner::{ProcessConfig, ProcessError, ProcessSpawner};
pub use traits::{BackendType, GenerationError, GenerationRequest, Generator, GeneratorConfig};

/// Create a generator for the configured backend
pub fn create_generator(config: GeneratorConfig) -> Result<Box<dyn Generator>, GenerationError> {
    match config.backend {
        BackendType::Gemini | BackendType::Anthropic => Ok(Box::new(HttpGenerator::new(config)?)),
        BackendType::Command => Ok(Box::new(CommandGenerator::from_config(config))),
    }
}
