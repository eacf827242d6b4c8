use std::io;
use std::process::Command;

/// Returns the process hostname.
pub fn hostname() -> Result<String, io::Error> {
    if let Ok(output) = Command::new("hostname").output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return Ok(name);
            }
        }
    }

    // Fallback: /etc/hostname, then environment.
    match std::fs::read_to_string("/etc/hostname") {
        Ok(content) => Ok(content.trim().to_string()),
        Err(_) => std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "could not determine hostname")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_trimmed() {
        // Not every environment can resolve a hostname; when one is
        // available it must be non-empty and free of surrounding whitespace.
        if let Ok(name) = hostname() {
            assert!(!name.is_empty());
            assert_eq!(name, name.trim());
        }
    }
}
