use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::ScrapeError;
use crate::record::{QuoteRecord, HEADER};

/// Write `records` as CSV to `destination`, replacing it atomically.
///
/// Rows go to a temp file next to the destination which is renamed into place
/// only after a successful flush. On failure the temp file is removed and the
/// destination is left untouched.
pub fn write_csv(records: &[QuoteRecord], destination: &Path) -> Result<usize, ScrapeError> {
    let io_err = |cause: io::Error| ScrapeError::Io {
        path: destination.to_path_buf(),
        cause,
    };

    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let tmp = create_temp(dir, destination).map_err(io_err)?;
    let written = write_rows(records, tmp.as_file()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(destination).map_err(|e| io_err(e.error))?;

    debug!(path = %destination.display(), rows = written, "Wrote CSV");
    Ok(written)
}

/// Temp file with the mode a plain create would give, or the mode of the file
/// it is about to replace.
#[cfg(unix)]
fn create_temp(dir: &Path, destination: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = fs::metadata(destination)
        .map(|meta| meta.permissions())
        .unwrap_or_else(|_| fs::Permissions::from_mode(0o666));
    tempfile::Builder::new()
        .permissions(permissions)
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn create_temp(dir: &Path, _destination: &Path) -> io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}

/// Header plus one row per record. Quotes only fields that need it.
pub fn write_rows<W: Write>(records: &[QuoteRecord], out: W) -> io::Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(HEADER)?;
    for record in records {
        wtr.write_record(record.as_row())?;
    }
    wtr.flush()?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawQuote;

    fn quote(theme: &str, lines: &str, author: &str) -> QuoteRecord {
        QuoteRecord::try_from_raw(RawQuote {
            theme: Some(theme.into()),
            url: Some(format!("/inspirational-quotes/{}", theme.to_lowercase())),
            image_url: Some("https://assets.passiton.com/q.jpg".into()),
            lines: Some(lines.into()),
            author: Some(author.into()),
        })
        .unwrap()
    }

    fn render(records: &[QuoteRecord]) -> String {
        let mut buf = Vec::new();
        write_rows(records, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_only_when_empty() {
        assert_eq!(render(&[]), "theme,url,imageUrl,lines,author\n");
    }

    #[test]
    fn plain_fields_are_unquoted() {
        let out = render(&[quote("Hope", "Keep going.", "Anon")]);
        assert_eq!(
            out,
            "theme,url,imageUrl,lines,author\n\
             Hope,/inspirational-quotes/hope,https://assets.passiton.com/q.jpg,Keep going.,Anon\n"
        );
    }

    #[test]
    fn special_characters_are_quoted() {
        let out = render(&[quote("Wit", "He said \"hi\", then\nleft", "O'Brien, Jr.")]);
        assert!(out.contains("\"He said \"\"hi\"\", then\nleft\""));
        assert!(out.contains("\"O'Brien, Jr.\""));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let written = vec![
            quote("Courage", "Grace, under \"pressure\"", "Hemingway"),
            quote("Multi", "line one\r\nline two", "  padded  "),
            quote("Unicode", "Ça va — très bien ✨", "Zoë"),
        ];

        assert_eq!(write_csv(&written, &path).unwrap(), 3);

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), HEADER);
        let back: Vec<QuoteRecord> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(back, written);
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.csv");
        write_csv(&[quote("Hope", "x", "y")], &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn existing_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale contents that are longer than the new file\n".repeat(50)).unwrap();

        write_csv(&[], &path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "theme,url,imageUrl,lines,author\n"
        );
    }

    #[cfg(unix)]
    fn mode(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn new_file_gets_the_usual_create_mode() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        std::fs::write(&plain, "x").unwrap();
        let path = dir.path().join("out.csv");

        write_csv(&[], &path).unwrap();
        assert_eq!(mode(&path), mode(&plain));
    }

    #[cfg(unix)]
    #[test]
    fn replaced_file_keeps_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "old\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        write_csv(&[quote("Hope", "x", "y")], &path).unwrap();
        assert_eq!(mode(&path), 0o640);
    }

    #[test]
    fn unwritable_destination_reports_path_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let path = blocker.join("out.csv");

        match write_csv(&[quote("Hope", "x", "y")], &path) {
            Err(ScrapeError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected io error, got {:?}", other),
        }
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
