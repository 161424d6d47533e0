use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::Result;

pub const DEFAULT_SECRETS_DIRECTORY: &str = "/var/lib/kubvernor/secrets";

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    pub controller_name: String,
    pub gateway_class_name: String,
    #[builder(default)]
    #[serde(default)]
    pub secrets_directory: Option<String>,
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("gateway class name must be not empty")]
    GatewayClassName,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        if self.gateway_class_name.is_empty() {
            return Err(ConfigurationError::GatewayClassName.into());
        }
        Ok(())
    }

    pub fn secrets_directory(&self) -> &str {
        self.secrets_directory.as_deref().unwrap_or(DEFAULT_SECRETS_DIRECTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_secrets_directory() {
        let configuration: Configuration = serde_yaml::from_str(
            r"
controller_name: kubvernor.com/proxy-controller
gateway_class_name: kubvernor
",
        )
        .unwrap();
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.secrets_directory(), DEFAULT_SECRETS_DIRECTORY);
    }

    #[test]
    fn rejects_empty_names() {
        let configuration = Configuration::builder().controller_name(String::new()).gateway_class_name("kubvernor".to_owned()).build();
        assert_eq!(configuration.validate().unwrap_err().to_string(), "controller name must be not empty");

        let configuration = Configuration::builder()
            .controller_name("kubvernor.com/proxy-controller".to_owned())
            .gateway_class_name(String::new())
            .secrets_directory(Some("/tmp".to_owned()))
            .build();
        assert_eq!(configuration.validate().unwrap_err().to_string(), "gateway class name must be not empty");
        assert_eq!(configuration.secrets_directory(), "/tmp");
    }
}
