pub mod secret;

pub use secret::{KubeSecretCredentialProvider, credential_from_secret};
