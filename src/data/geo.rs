use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use geo::{Centroid, Coord, Geometry, MapCoords, Point, Simplify};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{DashboardError, Result};

/// EPSG code every geometry is normalised to.
pub const CANONICAL_EPSG: u32 = 4326;

const GRS80_A: f64 = 6_378_137.0;
const GRS80_INV_F: f64 = 298.257_222_101;
const WEB_MERCATOR_R: f64 = 6_378_137.0;

// ---------------------------------------------------------------------------
// Coordinate reference systems
// ---------------------------------------------------------------------------

/// Source coordinate reference system of a geospatial input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, also used for GDA94 (4283) and GDA2020 (7844) whose
    /// offsets from WGS84 are well below map resolution.
    Geographic,
    /// EPSG:3857 / 900913.
    WebMercator,
    /// EPSG:3111, Lambert conformal conic on GRS80 used by Vicmap.
    VicGrid94,
    /// Map Grid of Australia: GDA94 (28348-28358) or GDA2020 (7846-7859).
    Mga { zone: u8 },
    /// Anything else. Only readable through PROJ (`proj-transforms` feature).
    Other(u32),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Crs {
        match code {
            4326 | 4283 | 7844 | 4269 => Crs::Geographic,
            3857 | 900913 => Crs::WebMercator,
            3111 => Crs::VicGrid94,
            28348..=28358 => Crs::Mga {
                zone: (code - 28300) as u8,
            },
            7846..=7859 => Crs::Mga {
                zone: (code - 7800) as u8,
            },
            other => Crs::Other(other),
        }
    }

    /// Convert a projected `(x, y)` into `(lon, lat)` degrees, for the systems
    /// handled without PROJ.
    pub fn to_lon_lat(self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            Crs::Geographic => Some((x, y)),
            Crs::WebMercator => {
                let lon = (x / WEB_MERCATOR_R).to_degrees();
                let lat = (2.0 * (y / WEB_MERCATOR_R).exp().atan() - FRAC_PI_2).to_degrees();
                Some((lon, lat))
            }
            Crs::VicGrid94 => Some(VICGRID94.inverse(x, y)),
            Crs::Mga { zone } => Some(TransverseMercator::mga(zone).inverse(x, y)),
            Crs::Other(_) => None,
        }
    }
}

/// Reprojects geometries from one source CRS into EPSG:4326.
pub struct Reprojector {
    crs: Crs,
    #[cfg(feature = "proj-transforms")]
    proj: Option<proj::Proj>,
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector").field("crs", &self.crs).finish()
    }
}

impl Reprojector {
    pub fn new(crs: Crs) -> std::result::Result<Self, String> {
        match crs {
            Crs::Other(code) => Self::external(code),
            _ => Ok(Reprojector {
                crs,
                #[cfg(feature = "proj-transforms")]
                proj: None,
            }),
        }
    }

    #[cfg(feature = "proj-transforms")]
    fn external(code: u32) -> std::result::Result<Self, String> {
        let proj = proj::Proj::new_known_crs(&format!("EPSG:{code}"), "EPSG:4326", None)
            .map_err(|e| format!("cannot reproject EPSG:{code}: {e}"))?;
        Ok(Reprojector {
            crs: Crs::Other(code),
            proj: Some(proj),
        })
    }

    #[cfg(not(feature = "proj-transforms"))]
    fn external(code: u32) -> std::result::Result<Self, String> {
        Err(format!(
            "unsupported coordinate system EPSG:{code} (enable the `proj-transforms` feature)"
        ))
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn is_identity(&self) -> bool {
        self.crs == Crs::Geographic
    }

    /// Reproject a whole geometry into EPSG:4326. `None` when a coordinate
    /// cannot be transformed.
    pub fn reproject(&self, geometry: &Geometry<f64>) -> Option<Geometry<f64>> {
        match self.crs {
            Crs::Geographic => Some(geometry.clone()),
            Crs::Other(_) => self.reproject_external(geometry),
            builtin => geometry
                .try_map_coords(move |Coord { x, y }| {
                    builtin
                        .to_lon_lat(x, y)
                        .map(|(lon, lat)| Coord { x: lon, y: lat })
                        .ok_or(())
                })
                .ok(),
        }
    }

    #[cfg(feature = "proj-transforms")]
    fn reproject_external(&self, geometry: &Geometry<f64>) -> Option<Geometry<f64>> {
        let proj = self.proj.as_ref()?;
        geometry
            .try_map_coords(move |Coord { x, y }| {
                proj.convert((x, y)).map(|(lon, lat)| Coord { x: lon, y: lat })
            })
            .map_err(|e| log::trace!("geometry left unprojected: {e}"))
            .ok()
    }

    #[cfg(not(feature = "proj-transforms"))]
    fn reproject_external(&self, _geometry: &Geometry<f64>) -> Option<Geometry<f64>> {
        None
    }
}

/// Read the EPSG code from a legacy GeoJSON `crs` member.
///
/// Accepts `urn:ogc:def:crs:EPSG::3111`, `EPSG:3111` and the OGC CRS84 alias.
/// Returns `None` when no `crs` member is present.
pub fn epsg_from_crs_member(members: Option<&JsonMap<String, JsonValue>>) -> Option<u32> {
    let name = members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    if name.ends_with("CRS84") {
        return Some(CANONICAL_EPSG);
    }
    name.rsplit(':').find(|s| !s.is_empty())?.parse().ok()
}

/// Build the reprojector for an optional EPSG code; no code means EPSG:4326.
pub fn resolve_crs(epsg: Option<u32>, path: &std::path::Path) -> Result<Reprojector> {
    let crs = epsg.map_or(Crs::Geographic, Crs::from_epsg);
    Reprojector::new(crs).map_err(|reason| DashboardError::unavailable(path, reason))
}

// ---------------------------------------------------------------------------
// Transverse Mercator inverse (MGA zones)
// ---------------------------------------------------------------------------

struct TransverseMercator {
    lon_0: f64,
    k_0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl TransverseMercator {
    fn mga(zone: u8) -> Self {
        TransverseMercator {
            lon_0: f64::from(zone) * 6.0 - 183.0,
            k_0: 0.9996,
            false_easting: 500_000.0,
            false_northing: 10_000_000.0,
        }
    }

    fn e2() -> f64 {
        let f = 1.0 / GRS80_INV_F;
        2.0 * f - f * f
    }

    #[cfg(test)]
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let e2 = Self::e2();
        let (e4, e6) = (e2 * e2, e2 * e2 * e2);
        let ep2 = e2 / (1.0 - e2);
        let phi = lat.to_radians();
        let (s, c, t) = (phi.sin(), phi.cos(), phi.tan());
        let n = GRS80_A / (1.0 - e2 * s * s).sqrt();
        let tt = t * t;
        let cc = ep2 * c * c;
        let a = (lon - self.lon_0).to_radians() * c;
        let m = GRS80_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());
        let x = self.false_easting
            + self.k_0
                * n
                * (a + (1.0 - tt + cc) * a.powi(3) / 6.0
                    + (5.0 - 18.0 * tt + tt * tt + 72.0 * cc - 58.0 * ep2) * a.powi(5) / 120.0);
        let y = self.false_northing
            + self.k_0
                * (m + n
                    * t
                    * (a * a / 2.0
                        + (5.0 - tt + 9.0 * cc + 4.0 * cc * cc) * a.powi(4) / 24.0
                        + (61.0 - 58.0 * tt + tt * tt + 600.0 * cc - 330.0 * ep2) * a.powi(6)
                            / 720.0));
        (x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e2 = Self::e2();
        let (e4, e6) = (e2 * e2, e2 * e2 * e2);
        let ep2 = e2 / (1.0 - e2);
        let m = (y - self.false_northing) / self.k_0;
        let mu = m / (GRS80_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let phi_1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (s, c, t) = (phi_1.sin(), phi_1.cos(), phi_1.tan());
        let cc = ep2 * c * c;
        let tt = t * t;
        let n = GRS80_A / (1.0 - e2 * s * s).sqrt();
        let r = GRS80_A * (1.0 - e2) / (1.0 - e2 * s * s).powf(1.5);
        let d = (x - self.false_easting) / (n * self.k_0);

        let lat = phi_1
            - (n * t / r)
                * (d * d / 2.0
                    - (5.0 + 3.0 * tt + 10.0 * cc - 4.0 * cc * cc - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * tt + 298.0 * cc + 45.0 * tt * tt - 252.0 * ep2
                        - 3.0 * cc * cc)
                        * d.powi(6)
                        / 720.0);
        let lon = self.lon_0.to_radians()
            + (d - (1.0 + 2.0 * tt + cc) * d.powi(3) / 6.0
                + (5.0 - 2.0 * cc + 28.0 * tt - 3.0 * cc * cc + 8.0 * ep2 + 24.0 * tt * tt)
                    * d.powi(5)
                    / 120.0)
                / c;
        (normalise_lon(lon.to_degrees()), lat.to_degrees())
    }
}

// ---------------------------------------------------------------------------
// Lambert conformal conic (2SP) inverse
// ---------------------------------------------------------------------------

struct LambertConic {
    lat_1: f64,
    lat_2: f64,
    lat_0: f64,
    lon_0: f64,
    false_easting: f64,
    false_northing: f64,
}

const VICGRID94: LambertConic = LambertConic {
    lat_1: -36.0,
    lat_2: -38.0,
    lat_0: -37.0,
    lon_0: 145.0,
    false_easting: 2_500_000.0,
    false_northing: 2_500_000.0,
};

impl LambertConic {
    fn eccentricity() -> f64 {
        let f = 1.0 / GRS80_INV_F;
        (2.0 * f - f * f).sqrt()
    }

    fn m(phi: f64, e: f64) -> f64 {
        phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt()
    }

    fn t(phi: f64, e: f64) -> f64 {
        let es = e * phi.sin();
        (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
    }

    /// `(n, a·F, rho_0)` for this projection.
    fn constants(&self) -> (f64, f64, f64) {
        let e = Self::eccentricity();
        let (p1, p2, p0) = (
            self.lat_1.to_radians(),
            self.lat_2.to_radians(),
            self.lat_0.to_radians(),
        );
        let (m1, m2) = (Self::m(p1, e), Self::m(p2, e));
        let (t1, t2, t0) = (Self::t(p1, e), Self::t(p2, e), Self::t(p0, e));
        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let af = GRS80_A * m1 / (n * t1.powf(n));
        (n, af, af * t0.powf(n))
    }

    #[cfg(test)]
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let e = Self::eccentricity();
        let (n, af, rho0) = self.constants();
        let rho = af * Self::t(lat.to_radians(), e).powf(n);
        let theta = n * (lon - self.lon_0).to_radians();
        (
            self.false_easting + rho * theta.sin(),
            self.false_northing + rho0 - rho * theta.cos(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e = Self::eccentricity();
        let (n, af, rho0) = self.constants();
        let dx = x - self.false_easting;
        let dy = rho0 - (y - self.false_northing);
        let sign = n.signum();
        let rho = sign * (dx * dx + dy * dy).sqrt();
        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / af).powf(1.0 / n);

        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            if (next - phi).abs() < 1e-12 {
                phi = next;
                break;
            }
            phi = next;
        }
        let lon = (theta / n).to_degrees() + self.lon_0;
        (normalise_lon(lon), phi.to_degrees())
    }
}

fn normalise_lon(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

// ---------------------------------------------------------------------------
// Geometry parsing helpers
// ---------------------------------------------------------------------------

/// Parse a GeoJSON geometry object stored as text (e.g. a `geo_shape` cell).
pub fn geometry_from_json_text(text: &str) -> Option<Geometry<f64>> {
    let geometry = match text.parse::<geojson::GeoJson>().ok()? {
        geojson::GeoJson::Geometry(g) => g,
        geojson::GeoJson::Feature(f) => f.geometry?,
        geojson::GeoJson::FeatureCollection(_) => return None,
    };
    Geometry::<f64>::try_from(geometry).ok()
}

/// Parse a `"lat, lon"` text cell (e.g. the `Geo Point` column).
pub fn point_from_lat_lon_text(text: &str) -> Option<Geometry<f64>> {
    let (lat, lon) = text.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(Geometry::Point(Point::new(lon, lat)))
}

/// Representative point of a geometry: its centroid.
pub fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.centroid()
}

/// Mean of the centroids of all given geometries, used as a map view centre.
pub fn mean_centroid<'a, I>(geometries: I) -> Option<Point<f64>>
where
    I: IntoIterator<Item = &'a Geometry<f64>>,
{
    let (sum_x, sum_y, n) = geometries
        .into_iter()
        .filter_map(representative_point)
        .fold((0.0, 0.0, 0usize), |(sx, sy, n), p| (sx + p.x(), sy + p.y(), n + 1));
    (n > 0).then(|| Point::new(sum_x / n as f64, sum_y / n as f64))
}

/// Douglas-Peucker simplification of the line and polygon parts of a
/// geometry. Points pass through unchanged.
pub fn simplify(geometry: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(g) => Geometry::LineString(g.simplify(tolerance)),
        Geometry::MultiLineString(g) => Geometry::MultiLineString(g.simplify(tolerance)),
        Geometry::Polygon(g) => Geometry::Polygon(g.simplify(tolerance)),
        Geometry::MultiPolygon(g) => Geometry::MultiPolygon(g.simplify(tolerance)),
        Geometry::GeometryCollection(c) => Geometry::GeometryCollection(
            c.iter().map(|g| simplify(g, tolerance)).collect(),
        ),
        other => other.clone(),
    }
}

/// Total number of coordinates in a geometry.
pub fn vertex_count(geometry: &Geometry<f64>) -> usize {
    use geo::CoordsIter;
    geometry.coords_count()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn vicgrid_origin_maps_to_projection_centre() {
        let (lon, lat) = Crs::VicGrid94.to_lon_lat(2_500_000.0, 2_500_000.0).unwrap();
        assert_abs_diff_eq!(lon, 145.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lat, -37.0, epsilon = 1e-9);
    }

    #[test]
    fn vicgrid_inverse_recovers_geelong() {
        let (x, y) = VICGRID94.forward(144.3607, -38.1499);
        let (lon, lat) = VICGRID94.inverse(x, y);
        assert_abs_diff_eq!(lon, 144.3607, epsilon = 1e-8);
        assert_abs_diff_eq!(lat, -38.1499, epsilon = 1e-8);
    }

    #[test]
    fn web_mercator_origin_is_null_island() {
        let (lon, lat) = Crs::WebMercator.to_lon_lat(0.0, 0.0).unwrap();
        assert_abs_diff_eq!(lon, 0.0);
        assert_abs_diff_eq!(lat, 0.0);
    }

    #[test]
    fn reads_legacy_crs_member() {
        let members = json!({
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3111" } }
        });
        assert_eq!(epsg_from_crs_member(members.as_object()), Some(3111));
        let crs84 = json!({
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:OGC:1.3:CRS84" } }
        });
        assert_eq!(epsg_from_crs_member(crs84.as_object()), Some(4326));
        assert_eq!(epsg_from_crs_member(None), None);
    }

    #[test]
    fn mga_codes_map_to_zones() {
        assert_eq!(Crs::from_epsg(28355), Crs::Mga { zone: 55 });
        assert_eq!(Crs::from_epsg(7854), Crs::Mga { zone: 54 });
        assert_eq!(Crs::from_epsg(2154), Crs::Other(2154));
    }

    #[test]
    fn mga_zone_origin_is_on_the_central_meridian() {
        let (lon, lat) = Crs::Mga { zone: 55 }
            .to_lon_lat(500_000.0, 10_000_000.0)
            .unwrap();
        assert_abs_diff_eq!(lon, 147.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lat, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn mga_inverse_recovers_melbourne() {
        let mga55 = TransverseMercator::mga(55);
        let (x, y) = mga55.forward(144.9631, -37.8136);
        assert_abs_diff_eq!(x, 320_704.446, epsilon = 0.01);
        assert_abs_diff_eq!(y, 5_812_911.700, epsilon = 0.01);
        let (lon, lat) = mga55.inverse(x, y);
        assert_abs_diff_eq!(lon, 144.9631, epsilon = 1e-7);
        assert_abs_diff_eq!(lat, -37.8136, epsilon = 1e-7);
    }

    #[test]
    fn reprojector_maps_every_vertex() {
        let reprojector = resolve_crs(Some(28355), std::path::Path::new("parcels.geojson")).unwrap();
        assert!(!reprojector.is_identity());
        let line = Geometry::LineString(geo::LineString::from(vec![
            (500_000.0, 10_000_000.0),
            (320_704.446_315_5, 5_812_911.699_529),
        ]));
        let Geometry::LineString(out) = reprojector.reproject(&line).unwrap() else {
            panic!("expected a line string");
        };
        assert_abs_diff_eq!(out.0[0].x, 147.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.0[1].x, 144.9631, epsilon = 1e-7);
        assert_abs_diff_eq!(out.0[1].y, -37.8136, epsilon = 1e-7);
    }

    #[cfg(not(feature = "proj-transforms"))]
    #[test]
    fn unknown_epsg_needs_proj() {
        let err = resolve_crs(Some(2154), std::path::Path::new("parcels.geojson")).unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
        assert!(err.to_string().contains("proj-transforms"));
    }

    #[cfg(feature = "proj-transforms")]
    #[test]
    fn proj_handles_other_epsg_codes() {
        // Lambert-93 origin of the projection: 3°E, 46.5°N.
        let reprojector = resolve_crs(Some(2154), std::path::Path::new("parcels.geojson")).unwrap();
        let point = Geometry::Point(Point::new(700_000.0, 6_600_000.0));
        let Geometry::Point(p) = reprojector.reproject(&point).unwrap() else {
            panic!("expected a point");
        };
        assert_abs_diff_eq!(p.x(), 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.y(), 46.5, epsilon = 1e-6);
    }

    #[test]
    fn parses_geo_point_text() {
        let g = point_from_lat_lon_text("-38.15, 144.36").unwrap();
        assert_eq!(g, Geometry::Point(Point::new(144.36, -38.15)));
        assert!(point_from_lat_lon_text("not a point").is_none());
        assert!(point_from_lat_lon_text("144.36, -38.15").is_none());
    }

    #[test]
    fn centroid_of_geo_shape_square() {
        let g = geometry_from_json_text(
            r#"{"type":"Polygon","coordinates":[[[144.0,-38.0],[144.2,-38.0],[144.2,-37.8],[144.0,-37.8],[144.0,-38.0]]]}"#,
        )
        .unwrap();
        let c = representative_point(&g).unwrap();
        assert_abs_diff_eq!(c.x(), 144.1, epsilon = 1e-9);
        assert_abs_diff_eq!(c.y(), -37.9, epsilon = 1e-9);
        assert_eq!(vertex_count(&g), 5);
    }

    #[test]
    fn simplify_drops_near_collinear_vertices() {
        let g = geometry_from_json_text(
            r#"{"type":"Polygon","coordinates":[[[144.0,-38.0],[144.005,-38.0001],[144.01,-38.0],[144.01,-37.99],[144.0,-37.99],[144.0,-38.0]]]}"#,
        )
        .unwrap();
        assert_eq!(vertex_count(&g), 6);
        assert_eq!(vertex_count(&simplify(&g, 0.001)), 5);
        let p = Geometry::Point(Point::new(1.0, 2.0));
        assert_eq!(simplify(&p, 0.01), p);
    }
}
