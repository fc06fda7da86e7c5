//! MIME-type lookup table, loaded from a flat text file (spec §6
//! "Mime-type file").

use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default)]
pub struct MimeTypes {
    by_extension: HashMap<String, String>,
}

impl MimeTypes {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    fn parse(contents: &str) -> Self {
        let mut by_extension = HashMap::new();
        for line in contents.lines() {
            let line = match line.split('#').next() {
                Some(l) => l.trim(),
                None => continue,
            };
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(mime) = fields.next() else { continue };
            for extension in fields {
                by_extension.insert(extension.to_string(), mime.to_string());
            }
        }
        MimeTypes { by_extension }
    }

    /// Looks up the MIME type for a filesystem path by its extension,
    /// falling back to `application/octet-stream`.
    pub fn lookup(&self, path: &str) -> &str {
        let extension = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("");
        self.by_extension.get(extension).map(String::as_str).unwrap_or("application/octet-stream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extensions_and_looks_up_by_suffix() {
        let mime = MimeTypes::parse("# comment\ntext/plain txt text\napplication/json json\n");
        assert_eq!(mime.lookup("/a/b.txt"), "text/plain");
        assert_eq!(mime.lookup("/a/b.json"), "application/json");
        assert_eq!(mime.lookup("/a/b.unknown"), "application/octet-stream");
    }

    #[test]
    fn ignores_inline_comments_and_blank_lines() {
        let mime = MimeTypes::parse("\n  \ntext/csv csv  # spreadsheet export\n");
        assert_eq!(mime.lookup("/data.csv"), "text/csv");
    }
}
