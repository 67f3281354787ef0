//! Remote file layout and the shell commands used to manage it

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Deadline for reading or writing one managed file
pub const FILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Directory quadlet container units are installed into
pub const CONTAINER_UNIT_DIR: &str = "/etc/containers/systemd";

/// Directory exporter configs are installed into
pub const EXPORTER_CONFIG_DIR: &str = "/etc/jumpstarter/exporters";

#[must_use]
pub fn container_unit_path(service: &str) -> String {
    format!("{CONTAINER_UNIT_DIR}/{service}.container")
}

#[must_use]
pub fn exporter_config_path(service: &str) -> String {
    format!("{EXPORTER_CONFIG_DIR}/{service}.yaml")
}

/// Prints the file base64-encoded if it exists; exits 1 with no stderr if it does not
///
/// The encoding keeps the transfer byte exact whatever the file holds.
#[must_use]
pub fn read_file_command(path: &str) -> String {
    let quoted = shell_words::quote(path);
    format!("test -f {quoted} && base64 {quoted}")
}

/// Decode the output of [`read_file_command`], which may be line-wrapped
///
/// # Errors
/// Returns the decode error if the output is not base64
pub fn decode_file_output(output: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = output.split_whitespace().collect();
    STANDARD.decode(compact)
}

/// Creates the parent directory and writes `content` byte for byte
#[must_use]
pub fn write_file_command(path: &str, content: &str) -> String {
    let quoted = shell_words::quote(path);
    let encoded = STANDARD.encode(content.as_bytes());
    let encoded = shell_words::quote(&encoded);
    match parent_dir(path) {
        Some(parent) => format!(
            "mkdir -p {} && printf '%s' {encoded} | base64 -d > {quoted}",
            shell_words::quote(parent)
        ),
        None => format!("printf '%s' {encoded} | base64 -d > {quoted}"),
    }
}

fn parent_dir(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => Some(parent),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(
            container_unit_path("rig-1"),
            "/etc/containers/systemd/rig-1.container"
        );
        assert_eq!(
            exporter_config_path("rig-1"),
            "/etc/jumpstarter/exporters/rig-1.yaml"
        );
    }

    #[test]
    fn test_read_command_quotes_path() {
        assert_eq!(
            read_file_command("/etc/a b.yaml"),
            "test -f '/etc/a b.yaml' && base64 '/etc/a b.yaml'"
        );
    }

    #[test]
    fn test_decode_wrapped_output() {
        assert_eq!(decode_file_output("aGVs\nbG8K\n").unwrap(), b"hello\n");
        assert_eq!(decode_file_output("").unwrap(), b"");
        // invalid UTF-8 survives the trip
        assert_eq!(decode_file_output("/w==\n").unwrap(), vec![0xff]);
        assert!(decode_file_output("not base64!").is_err());
    }

    #[test]
    fn test_write_command() {
        let cmd = write_file_command("/etc/jumpstarter/exporters/x.yaml", "hi\n");
        assert_eq!(
            cmd,
            "mkdir -p /etc/jumpstarter/exporters && printf '%s' aGkK | base64 -d > /etc/jumpstarter/exporters/x.yaml"
        );

        assert_eq!(
            write_file_command("/x", ""),
            "printf '%s' '' | base64 -d > /x"
        );
    }
}
