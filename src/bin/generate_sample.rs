//! Writes a synthetic `Data/` directory with every source the dashboard reads.
//!
//! Usage: `generate_sample [OUTPUT_DIR]` (default `Data`).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_json::json;

use rusty_atlas::DashboardConfig;

const LGAS: &[(&str, &str, f64, f64, f64)] = &[
    // name, code, lat, lon, base population
    ("Greater Geelong", "22750", -38.1499, 144.3617, 210_000.0),
    ("Ballarat", "20570", -37.5622, 143.8503, 95_000.0),
    ("Greater Bendigo", "22620", -36.7570, 144.2794, 92_000.0),
    ("Surf Coast", "26490", -38.3300, 144.1300, 21_000.0),
];

const AGE_GROUPS: &[&str] = &[
    "0-4", "5-9", "10-14", "15-19", "20-24", "25-29", "30-34", "35-39", "40-44", "45-49",
    "50-54", "55-59", "60-64", "65-69", "70-74", "75-79", "80-84", "85+",
];

const SUBURBS: &[(&str, f64, f64)] = &[
    ("Geelong", -38.1480, 144.3600),
    ("Belmont", -38.1750, 144.3420),
    ("Newtown", -38.1530, 144.3330),
    ("Lara", -38.0230, 144.4060),
    ("Armstrong Creek", -38.2300, 144.3700),
];

const FUELS: &[(&str, f64, f64)] = &[
    // code, registrations in 1990, yearly growth
    ("G", 9_000.0, 150.0),
    ("D", 2_000.0, 220.0),
    ("S", 0.0, 40.0),
    ("R", 0.0, 25.0),
    ("P", 300.0, -5.0),
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let out_dir = std::env::args().nth(1).unwrap_or_else(|| "Data".into());
    let out_dir = Path::new(&out_dir);
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let sources = DashboardConfig::default().sources;
    let mut rng = SimpleRng::new(42);

    write_lga_population(&out_dir.join(&sources.lga_population), &mut rng)?;
    write_lga_coordinates(&out_dir.join(&sources.lga_coordinates))?;
    write_building_permits(&out_dir.join(&sources.building_permits), &mut rng)?;
    write_population(&out_dir.join(&sources.population), &mut rng)?;
    let vehicles = vehicle_rows(&mut rng);
    write_vehicles_csv(&out_dir.join(&sources.vehicle_registrations), &vehicles)?;
    write_vehicles_parquet(
        &out_dir
            .join(&sources.vehicle_registrations)
            .with_extension("parquet"),
        &vehicles,
    )?;
    write_housing(&out_dir.join(&sources.housing_development), &mut rng)?;
    write_traffic(&out_dir.join(&sources.traffic_counts), &mut rng)?;
    write_cadastral(&out_dir.join(&sources.cadastral), &mut rng)?;

    println!("Wrote sample sources to {}", out_dir.display());
    Ok(())
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(file, value)?;
    Ok(())
}

fn write_lga_population(path: &Path, rng: &mut SimpleRng) -> Result<()> {
    let mut wtr = csv_writer(path)?;
    let mut header = vec!["LGA", "LGA_CODE", "Year"];
    header.extend_from_slice(AGE_GROUPS);
    header.push("Total Population");
    wtr.write_record(&header)?;

    for &(name, code, _, _, base) in LGAS {
        for year in 2001..=2022 {
            let t = (year - 2001) as f64;
            let mut record = vec![name.to_string(), code.to_string(), year.to_string()];
            let mut total = 0.0;
            for (k, _) in AGE_GROUPS.iter().enumerate() {
                // Older bands shrink; the whole LGA grows about 1.5% a year.
                let share = (AGE_GROUPS.len() - k) as f64 / 171.0;
                let cycle = 1.0 + 0.02 * (t * std::f64::consts::TAU / 5.0 + k as f64).sin();
                let count = (base * share * (1.0 + 0.015 * t) * cycle + rng.gauss(0.0, 25.0))
                    .max(0.0)
                    .round();
                total += count;
                record.push(format!("{count}"));
            }
            record.push(format!("{total}"));
            wtr.write_record(&record)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn write_lga_coordinates(path: &Path) -> Result<()> {
    let mut wtr = csv_writer(path)?;
    wtr.write_record(["LGA_CODE", "LGA_NAME", "Geo Point"])?;
    for &(name, code, lat, lon, _) in LGAS {
        wtr.write_record([code, name, format!("{lat}, {lon}").as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_building_permits(path: &Path, rng: &mut SimpleRng) -> Result<()> {
    const TYPES: &[&str] = &["Building Permit", "Occupancy Permit", "Demolition Permit"];
    let mut wtr = csv_writer(path)?;
    wtr.write_record([
        "permit_certificate_number",
        "issue_date",
        "commence_by_date",
        "completed_by_date",
        "permit_certificate_type",
        "estimated_cost_of_works",
    ])?;
    for n in 0..600 {
        let year = 2018 + rng.below(6);
        let month = 1 + rng.below(12);
        let day = 1 + rng.below(28);
        let cost = rng.gauss(250_000.0, 90_000.0).abs().round();
        wtr.write_record([
            format!("BP{n:05}"),
            format!("{year}-{month:02}-{day:02}"),
            format!("{}-{month:02}-{day:02}", year + 1),
            format!("{}-{month:02}-{day:02}", year + 3),
            TYPES[rng.below(TYPES.len())].to_string(),
            format!("${cost}"),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_population(path: &Path, rng: &mut SimpleRng) -> Result<()> {
    let years: Vec<i64> = (2001..=2022).collect();
    let mut wtr = csv_writer(path)?;
    let mut header = vec!["Sex".to_string(), "Age".to_string()];
    header.extend(years.iter().map(|y| y.to_string()));
    wtr.write_record(&header)?;

    for sex in ["Male", "Female"] {
        for age in 0..=100 {
            let mut record = vec![sex.to_string(), age.to_string()];
            let base = 3_200.0 * (-(age as f64) / 60.0).exp();
            for &year in &years {
                let growth = 1.0 + 0.01 * (year - 2001) as f64;
                let count = (base * growth + rng.gauss(0.0, 20.0)).max(0.0).round();
                record.push(format!("{count}"));
            }
            wtr.write_record(&record)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

struct VehicleRow {
    year: i64,
    fuel: &'static str,
    total: f64,
}

fn vehicle_rows(rng: &mut SimpleRng) -> Vec<VehicleRow> {
    let mut rows = Vec::new();
    for year in 1990..=2024 {
        let t = (year - 1990) as f64;
        for &(fuel, start, growth) in FUELS {
            let mut total = (start + growth * t + rng.gauss(0.0, 60.0)).max(0.0).round();
            // The current year is only partly registered.
            if year == 2024 {
                total = (total * 0.3).round();
            }
            rows.push(VehicleRow { year, fuel, total });
        }
    }
    rows
}

fn write_vehicles_csv(path: &Path, rows: &[VehicleRow]) -> Result<()> {
    let mut wtr = csv_writer(path)?;
    wtr.write_record(["NB_YEAR_MFC_VEH", "CD_CL_FUEL_ENG", "TOTAL1"])?;
    for row in rows {
        wtr.write_record([row.year.to_string(), row.fuel.to_string(), row.total.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_vehicles_parquet(path: &Path, rows: &[VehicleRow]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("NB_YEAR_MFC_VEH", DataType::Int64, false),
        Field::new("CD_CL_FUEL_ENG", DataType::Utf8, false),
        Field::new("TOTAL1", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.year).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.fuel).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.total).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building vehicle record batch")?;

    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn square(lon: f64, lat: f64, half: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [lon - half, lat - half],
            [lon + half, lat - half],
            [lon + half, lat + half],
            [lon - half, lat + half],
            [lon - half, lat - half],
        ]]
    })
}

fn write_housing(path: &Path, rng: &mut SimpleRng) -> Result<()> {
    let mut wtr = csv_writer(path)?;
    wtr.write_record(["suburb", "consyear", "shape_area", "dwelling_c", "geo_shape"])?;
    for (k, &(suburb, lat, lon)) in SUBURBS.iter().enumerate() {
        for year in 2005..=2020 {
            // A handful of developments per suburb and year.
            for _ in 0..1 + rng.below(4) {
                let t = (year - 2005) as f64;
                let area = (800.0 + 60.0 * t * (k + 1) as f64 + rng.gauss(0.0, 120.0)).abs();
                let dwellings = (1.0 + 0.3 * t + rng.gauss(0.0, 1.0)).max(1.0).round();
                let shape = square(
                    lon + rng.gauss(0.0, 0.004),
                    lat + rng.gauss(0.0, 0.004),
                    0.0005,
                );
                wtr.write_record([
                    suburb.to_string(),
                    year.to_string(),
                    format!("{area:.1}"),
                    format!("{dwellings}"),
                    shape.to_string(),
                ])?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

fn write_traffic(path: &Path, rng: &mut SimpleRng) -> Result<()> {
    let mut features = Vec::new();
    for site in 0..80 {
        let lon = 144.25 + 0.25 * rng.next_f64();
        let lat = -38.25 + 0.2 * rng.next_f64();
        let year = 2015 + rng.below(8) as i64;
        let aadt = (6_000.0 + 400.0 * (year - 2015) as f64 + rng.gauss(0.0, 2_500.0))
            .max(100.0)
            .round();
        features.push(json!({
            "type": "Feature",
            "properties": {
                "SITE_ID": site,
                "LAST_YEAR": year,
                "AADT_ALLVE": aadt,
            },
            "geometry": {"type": "Point", "coordinates": [lon, lat]},
        }));
    }
    write_json(
        path,
        &json!({"type": "FeatureCollection", "features": features}),
    )
}

fn write_cadastral(path: &Path, rng: &mut SimpleRng) -> Result<()> {
    const ZONES: &[&str] = &["GRZ1", "GRZ2", "NRZ1", "C1Z", "IN1Z"];
    let mut features = Vec::new();
    for row in 0..12 {
        for col in 0..12 {
            let x0 = 144.34 + col as f64 * 0.002;
            let y0 = -38.16 + row as f64 * 0.002;
            // Densified edges give the simplifier something to remove.
            let mut ring = Vec::new();
            for i in 0..10 {
                ring.push([x0 + i as f64 * 0.0002, y0 + rng.gauss(0.0, 0.00001)]);
            }
            ring.push([x0 + 0.0018, y0 + 0.0018]);
            ring.push([x0, y0 + 0.0018]);
            let first = ring[0];
            ring.push(first);
            features.push(json!({
                "type": "Feature",
                "properties": {
                    "PFI": format!("{}", 5_000_000 + row * 12 + col),
                    "ZONE_CODE": ZONES[rng.below(ZONES.len())],
                    "AREA": (rng.gauss(650.0, 120.0)).abs().round(),
                },
                "geometry": {"type": "Polygon", "coordinates": [ring]},
            }));
        }
    }
    write_json(
        path,
        &json!({"type": "FeatureCollection", "features": features}),
    )
}
