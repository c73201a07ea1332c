use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Shortest scientific form that parses back to the identical `f64`.
#[inline]
pub fn format_float(v: f64) -> String {
    format!("{:e}", v)
}

/// Write one comma separated line.
pub fn write_row<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        out.write_all(field.as_ref().as_bytes())?;
    }
    out.write_all(b"\n")
}

/// Write column data to a CSV file with headers.
pub fn write_csv<P: AsRef<Path>>(path: P, headers: &[&str], data: &[Vec<f64>]) -> io::Result<()> {
    if !headers.is_empty() && !data.is_empty() && headers.len() != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Headers count ({}) doesn't match data columns ({})",
                headers.len(),
                data.len()
            ),
        ));
    }

    let mut file = BufWriter::new(File::create(path)?);
    write_row(&mut file, headers)?;

    let n_rows = data.iter().map(|col| col.len()).max().unwrap_or(0);
    for i in 0..n_rows {
        let row: Vec<String> = data
            .iter()
            .map(|col| col.get(i).map(|&v| format_float(v)).unwrap_or_default())
            .collect();
        write_row(&mut file, &row)?;
    }

    file.flush()
}
