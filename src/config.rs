use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_AIRTABLE_URL: &str = "https://api.airtable.com/v0";

/// Column names the pipeline reads and writes.
#[derive(Clone, Debug)]
pub struct FieldNames {
    pub status: String,
    pub participant: String,
    pub achievement: String,
    pub attachment: String,
    pub programme: String,
    pub certificate_image: String,
    pub record_id: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            status: "PDF Status".to_string(),
            participant: "Participant Full Name".to_string(),
            achievement: "Achievement level".to_string(),
            attachment: "PDF Attachment".to_string(),
            programme: "Programme name (from 📺 Programmes)".to_string(),
            certificate_image: "Certificate image (from 📺 Programmes)".to_string(),
            record_id: "RecordID".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub api_url: String,
    pub api_key: String,
    pub base_id: String,
    pub table_name: String,
    pub fields: FieldNames,
    pub pending_status: String,
    pub done_status: String,
}

/// How local raster/PDF files are named.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamingStrategy {
    RecordId,
    Names,
}

impl FromStr for NamingStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record-id" | "record_id" | "id" => Ok(Self::RecordId),
            "names" | "name" => Ok(Self::Names),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DriveConfig {
    pub folder_id: String,
    pub service_account_file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct FontConfig {
    pub regular: PathBuf,
    pub bold: PathBuf,
    pub size_px: f32,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub store: StoreConfig,
    pub output_dir: PathBuf,
    pub naming: NamingStrategy,
    /// `Some` when finished PDFs are uploaded and local files removed.
    pub upload: Option<DriveConfig>,
    pub fonts: FontConfig,
    pub pdf_jpeg_quality: u8,
    pub poll_interval: Duration,
    pub batch_command: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));
        let or_default =
            |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let api_key = required("AIRTABLE_API_KEY")?;
        let base_id = required("AIRTABLE_BASE_ID")?;
        let table_name = required("AIRTABLE_TABLE_NAME")?;

        let defaults = FieldNames::default();
        let fields = FieldNames {
            status: or_default("FIELD_PDF_STATUS", &defaults.status),
            participant: or_default("FIELD_PARTICIPANT", &defaults.participant),
            achievement: or_default("FIELD_ACHIEVEMENT", &defaults.achievement),
            attachment: or_default("FIELD_PDF_ATTACHMENT", &defaults.attachment),
            programme: or_default("FIELD_PROGRAMME", &defaults.programme),
            certificate_image: or_default("FIELD_CERTIFICATE_IMAGE", &defaults.certificate_image),
            record_id: or_default("FIELD_RECORD_ID", &defaults.record_id),
        };

        let store = StoreConfig {
            api_url: or_default("AIRTABLE_API_URL", DEFAULT_AIRTABLE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            base_id,
            table_name,
            fields,
            pending_status: or_default("STATUS_PENDING", "Generate PDF"),
            done_status: or_default("STATUS_DONE", "PDF Generated"),
        };

        let naming = match var("OUTPUT_NAMING") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "OUTPUT_NAMING",
                value,
            })?,
            None => NamingStrategy::RecordId,
        };

        let folder_id = var("DRIVE_FOLDER_ID");
        let upload_enabled = match var("UPLOAD_ENABLED") {
            Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid {
                name: "UPLOAD_ENABLED",
                value,
            })?,
            None => folder_id.is_some(),
        };
        let upload = match (upload_enabled, folder_id) {
            (false, _) => None,
            (true, Some(folder_id)) => Some(DriveConfig {
                folder_id,
                service_account_file: PathBuf::from(or_default(
                    "GOOGLE_SERVICE_ACCOUNT_FILE",
                    "./service_account.json",
                )),
            }),
            // Uploading needs a destination folder.
            (true, None) => {
                return Err(ConfigError::Invalid {
                    name: "UPLOAD_ENABLED",
                    value: "true without DRIVE_FOLDER_ID".to_string(),
                })
            }
        };

        let fonts = FontConfig {
            regular: PathBuf::from(or_default(
                "FONT_REGULAR_PATH",
                "./fonts/Montserrat-Regular.ttf",
            )),
            bold: PathBuf::from(or_default("FONT_BOLD_PATH", "./fonts/Montserrat-SemiBold.ttf")),
            size_px: parse_or("FONT_SIZE_PX", var("FONT_SIZE_PX"), 48.0)?,
        };

        let pdf_jpeg_quality: u8 = parse_or("PDF_JPEG_QUALITY", var("PDF_JPEG_QUALITY"), 92)?;
        if !(1..=100).contains(&pdf_jpeg_quality) {
            return Err(ConfigError::Invalid {
                name: "PDF_JPEG_QUALITY",
                value: pdf_jpeg_quality.to_string(),
            });
        }

        let poll_secs: u64 = parse_or("POLL_INTERVAL_SECS", var("POLL_INTERVAL_SECS"), 60)?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let batch_command = var("BATCH_COMMAND")
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>());

        Ok(Self {
            store,
            output_dir: PathBuf::from(or_default("OUTPUT_DIR", ".")),
            naming,
            upload,
            fonts,
            pdf_jpeg_quality,
            poll_interval: Duration::from_secs(poll_secs),
            batch_command,
        })
    }

    pub fn upload_enabled(&self) -> bool {
        self.upload.is_some()
    }
}

fn parse_or<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("AIRTABLE_API_KEY", "key"),
        ("AIRTABLE_BASE_ID", "app123"),
        ("AIRTABLE_TABLE_NAME", "Participants"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.store.api_url, DEFAULT_AIRTABLE_URL);
        assert_eq!(config.store.pending_status, "Generate PDF");
        assert_eq!(config.store.fields.participant, "Participant Full Name");
        assert_eq!(config.naming, NamingStrategy::RecordId);
        assert!(!config.upload_enabled());
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.fonts.size_px, 48.0);
        assert!(config.batch_command.is_none());
    }

    #[test]
    fn missing_required_var_is_reported_by_name() {
        let err = load(&REQUIRED[..2]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("AIRTABLE_TABLE_NAME")));

        let mut vars = REQUIRED.to_vec();
        vars[0] = ("AIRTABLE_API_KEY", "  ");
        let err = load(&vars).unwrap_err();
        assert_eq!(err.to_string(), "AIRTABLE_API_KEY must be set");
    }

    #[test]
    fn drive_folder_enables_upload() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DRIVE_FOLDER_ID", "folder-1"));
        let config = load(&vars).unwrap();
        let drive = config.upload.unwrap();
        assert_eq!(drive.folder_id, "folder-1");
        assert_eq!(drive.service_account_file, PathBuf::from("./service_account.json"));

        vars.push(("UPLOAD_ENABLED", "false"));
        assert!(!load(&vars).unwrap().upload_enabled());
    }

    #[test]
    fn upload_without_folder_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("UPLOAD_ENABLED", "true"));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid {
                name: "UPLOAD_ENABLED",
                ..
            })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (name, value) in [
            ("POLL_INTERVAL_SECS", "soon"),
            ("POLL_INTERVAL_SECS", "0"),
            ("OUTPUT_NAMING", "random"),
            ("PDF_JPEG_QUALITY", "0"),
            ("UPLOAD_ENABLED", "maybe"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((name, value));
            assert!(
                matches!(load(&vars), Err(ConfigError::Invalid { .. })),
                "{name}={value} accepted"
            );
        }
    }

    #[test]
    fn batch_command_is_split_on_whitespace() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("BATCH_COMMAND", "/usr/bin/env  certgen --quiet"));
        vars.push(("OUTPUT_NAMING", "names"));
        let config = load(&vars).unwrap();
        assert_eq!(
            config.batch_command.unwrap(),
            vec!["/usr/bin/env", "certgen", "--quiet"]
        );
        assert_eq!(config.naming, NamingStrategy::Names);
    }
}
