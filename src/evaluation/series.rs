use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Error, Write};
use std::path::Path;

pub enum SeriesFormat {
    Csv,
    Tsv,
    Json,
}

/// One `(sub-bin count, estimate, standard error)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub sub_bins: usize,
    pub value: f64,
    pub error: f64,
}

/// Scale-dependent estimate of one order, finest resolution last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSeries {
    label: String,
    points: Vec<SeriesPoint>,
}

impl ResultSeries {
    pub fn new<L: Into<String>>(label: L, points: Vec<SeriesPoint>) -> Self {
        Self {
            label: label.into(),
            points,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SeriesPoint> {
        self.points.iter()
    }

    pub fn sub_bins(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.sub_bins).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn export<P: AsRef<Path>>(&self, path: P, fmt: SeriesFormat) -> Result<(), Error> {
        match fmt {
            SeriesFormat::Csv => self.export_with_delimiter(path, ','),
            SeriesFormat::Tsv => self.export_with_delimiter(path, '\t'),
            SeriesFormat::Json => self.export_json(path),
        }
    }

    fn export_with_delimiter<P: AsRef<Path>>(&self, path: P, delimiter: char) -> Result<(), Error> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "sub_bins{d}value{d}error", d = delimiter)?;
        for p in &self.points {
            writeln!(
                w,
                "{}{d}{:.12}{d}{:.12}",
                p.sub_bins,
                p.value,
                p.error,
                d = delimiter
            )?;
        }
        w.flush()
    }

    fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut w = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut w, self)?;
        writeln!(w)?;
        w.flush()
    }
}

impl<'a> IntoIterator for &'a ResultSeries {
    type Item = &'a SeriesPoint;
    type IntoIter = std::slice::Iter<'a, SeriesPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;
    use tempfile::NamedTempFile;

    fn point(sub_bins: usize, value: f64, error: f64) -> SeriesPoint {
        SeriesPoint {
            sub_bins,
            value,
            error,
        }
    }

    fn two_points() -> ResultSeries {
        ResultSeries::new("BP(2)", vec![point(2, 1.0, 0.5), point(3, 0.25, 0.125)])
    }

    #[test]
    fn accessors() {
        let s = two_points();
        assert_eq!(s.label(), "BP(2)");
        assert_eq!(s.len(), 2);
        assert_eq!(s.sub_bins(), vec![2, 3]);
        assert_eq!(s.values(), vec![1.0, 0.25]);
        assert_eq!((&s).into_iter().count(), 2);
    }

    #[test]
    fn export_csv_with_two_rows() {
        let tf = NamedTempFile::new().unwrap();
        two_points().export(tf.path(), SeriesFormat::Csv).unwrap();

        let got = fs::read_to_string(tf.path()).unwrap();
        let exp = "\
sub_bins,value,error
2,1.000000000000,0.500000000000
3,0.250000000000,0.125000000000
";
        assert_eq!(got, exp);
    }

    #[test]
    fn export_tsv_with_two_rows() {
        let tf = NamedTempFile::new().unwrap();
        two_points().export(tf.path(), SeriesFormat::Tsv).unwrap();

        let got = fs::read_to_string(tf.path()).unwrap();
        let exp = "\
sub_bins\tvalue\terror
2\t1.000000000000\t0.500000000000
3\t0.250000000000\t0.125000000000
";
        assert_eq!(got, exp);
    }

    #[test]
    fn export_json_keeps_label_and_points() {
        let tf = NamedTempFile::new().unwrap();
        two_points().export(tf.path(), SeriesFormat::Json).unwrap();

        let v: Value = serde_json::from_str(&fs::read_to_string(tf.path()).unwrap()).unwrap();
        assert_eq!(v["label"], "BP(2)");
        let pts = v["points"].as_array().unwrap();
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[1]["sub_bins"], 3);
        assert_eq!(pts[1]["error"], 0.125);
    }

    #[test]
    fn export_empty_csv() {
        let tf = NamedTempFile::new().unwrap();
        ResultSeries::new("empty", vec![])
            .export(tf.path(), SeriesFormat::Csv)
            .unwrap();
        assert_eq!(
            fs::read_to_string(tf.path()).unwrap(),
            "sub_bins,value,error\n"
        );
    }
}
