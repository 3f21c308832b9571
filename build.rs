use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // For each hid.bin file in our tests/data directory, create one basic test function
    // that decodes that report descriptor and checks the fields of every report
    // are laid out back to back.
    let datadir: PathBuf = [concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data")]
        .iter()
        .collect();
    let out_dir = std::env::var_os("OUT_DIR").ok_or("OUT_DIR is not set")?;
    let dest_path = PathBuf::from(&out_dir).join("test-report-descriptors.rs");
    let mut file = std::fs::File::create(dest_path)?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}", datadir.display());

    writeln!(file, "use hidfield::*;")?;
    writeln!(file)?;

    // The data files are excluded from the published crate
    let Ok(entries) = std::fs::read_dir(&datadir) else {
        return Ok(());
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().ends_with(".hid.bin"))
        .collect();
    paths.sort();

    for path in paths {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let funcname = filename.replace([':', '.', '-'], "_");
        writeln!(
            file,
            "
#[test]
#[allow(non_snake_case)]
fn test_{funcname}() {{
    let bytes: Vec<u8> = std::fs::read({path:?}).unwrap();
    let rdesc = ReportDescriptor::parse(&bytes)
        .unwrap_or_else(|e| panic!(\"Failed to parse {filename}: {{e}}\"));
    for direction in Direction::ALL {{
        for report in rdesc.reports(direction) {{
            let mut offset = 0;
            for field in report.fields() {{
                assert_eq!(field.bit_offset(), offset, \"{filename}: gap before {{field:?}}\");
                assert_eq!(field.direction(), direction);
                assert_eq!(field.report_id(), report.report_id());
                offset = field.bits().end;
            }}
            assert_eq!(report.size_in_bits(), offset);
        }}
    }}
}}
"
        )?;
    }

    Ok(())
}
