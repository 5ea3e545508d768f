#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use sdfview::dataset::{Column, Dataset, Record, Schema, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `n` synthetic molecules: MW climbs by 10 from 100, LogP cycles -1..=5, every
/// seventh row has no MW.
pub fn molecule_table(n: usize) -> Dataset {
    let schema = Schema::new(
        vec![
            Column::text("Name"),
            Column::text("SMILES"),
            Column::numeric("MW"),
            Column::numeric("LogP"),
        ],
        "SMILES",
    )
    .unwrap();
    let chains = ["C", "CC", "CCO", "c1ccccc1", "CC(=O)O", "CCN", "C1CCCCC1"];
    let records = (0..n)
        .map(|i| {
            let mw = if i % 7 == 6 {
                Value::Null
            } else {
                Value::Number(100.0 + 10.0 * i as f64)
            };
            Record::new(vec![
                Value::Text(format!("mol-{}", i + 1)),
                Value::Text(chains[i % chains.len()].to_string()),
                mw,
                Value::Number((i % 7) as f64 - 1.0),
            ])
        })
        .collect();
    Dataset::new(schema, records).unwrap()
}

pub fn names(dataset: &Dataset) -> Vec<String> {
    (0..dataset.len())
        .map(|i| dataset.value(i, "Name").map(|v| v.to_string()).unwrap_or_default())
        .collect()
}

pub const SAMPLE_SDF: &str = "\
ethanol
  sdfview

  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0
    1.2990    0.7500    0.0000 C   0  0
    2.5981    0.0000    0.0000 O   0  0
  1  2  1  0
  2  3  1  0
M  END
>  <SMILES>
CCO

>  <MW>
46.07

>  <LogP>
-0.31

$$$$
aspirin
  sdfview

  0  0  0  0  0  0  0  0  0  0999 V2000
M  END
>  <SMILES>
CC(=O)Oc1ccccc1C(=O)O

>  <MW>
180.16

>  <LogP>
1.19

$$$$
atorvastatin
  sdfview

  0  0  0  0  0  0  0  0  0  0999 V2000
M  END
>  <SMILES>
CC(C)c1c(C(=O)Nc2ccccc2)c(-c2ccccc2)c(-c2ccc(F)cc2)n1CCC(O)CC(O)CC(=O)O

>  <MW>
558.64

>  <LogP>
4.46

$$$$
";

pub const SAMPLE_CSV: &str = "\
Name,SMILES,MW,LogP
ethanol,CCO,46.07,-0.31
aspirin,CC(=O)Oc1ccccc1C(=O)O,180.16,1.19
atorvastatin,CC(C)c1c(C(=O)Nc2ccccc2)c(-c2ccccc2)c(-c2ccc(F)cc2)n1CCC(O)CC(O)CC(=O)O,558.64,4.46
";

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

pub fn write_gz(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}
