use crate::edits::esf::PingKey;
use crate::error::SwathEditError;
use crate::flags::BeamFlag;
use crate::geometry::attitude::{attitude_for_ping, AsyncNavigation, BiasParameters, Navigation};
use crate::geometry::corrector::{correct_beam, CorrectedBeam, RawBeam};
use crate::geometry::footprint::Footprint;
use crate::gridding::bounds::SurveyExtent;
use crate::gridding::grid::BeamSample;
use crate::projection::Projection;
use crate::swath::decoded::{DecodedFile, DecodedPing};
use crate::utils::constants::EDIT_TIME_TOLERANCE;
use crate::utils::coords::DegreeScale;
use std::path::PathBuf;
use tracing::{info, warn};

type Result<T> = std::result::Result<T, SwathEditError>;

fn column<T: Clone>(len: usize, value: T, what: &str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| SwathEditError::AllocationFailed(what.to_string()))?;
    v.resize(len, value);
    Ok(v)
}

/// One ping with its beams stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    pub nav: Navigation,
    /// Index among pings sharing the same time
    pub multiplicity: i32,
    pub bath: Vec<f64>,
    pub across: Vec<f64>,
    pub along: Vec<f64>,
    pub amp: Vec<f64>,
    /// Current edit state
    pub flags: Vec<BeamFlag>,
    /// Edit state when loaded, before any edits were replayed
    pub original_flags: Vec<BeamFlag>,
    pub bathcorr: Vec<f64>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    /// Projected beam positions, NaN until projected or when projection failed
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub nav_x: f64,
    pub nav_y: f64,
}

impl Ping {
    /// Builds a ping from decoded data. Non-null soundings with NaN geometry become null.
    pub fn from_decoded(decoded: &DecodedPing, previous: Option<&Ping>) -> Result<Ping> {
        let n = decoded.beams.len();
        let multiplicity = match (decoded.sensor_head, previous) {
            (Some(head), _) => head,
            (None, Some(p)) if (decoded.nav.time_d - p.nav.time_d).abs() < EDIT_TIME_TOLERANCE => {
                p.multiplicity + 1
            }
            _ => 0,
        };

        let mut ping = Ping {
            nav: decoded.nav,
            multiplicity,
            bath: column(n, 0.0, "bathymetry")?,
            across: column(n, 0.0, "acrosstrack distances")?,
            along: column(n, 0.0, "alongtrack distances")?,
            amp: column(n, 0.0, "amplitudes")?,
            flags: column(n, BeamFlag::Null, "beam flags")?,
            original_flags: column(n, BeamFlag::Null, "original beam flags")?,
            bathcorr: column(n, f64::NAN, "corrected bathymetry")?,
            lon: column(n, f64::NAN, "sounding longitudes")?,
            lat: column(n, f64::NAN, "sounding latitudes")?,
            x: column(n, f64::NAN, "sounding eastings")?,
            y: column(n, f64::NAN, "sounding northings")?,
            nav_x: f64::NAN,
            nav_y: f64::NAN,
        };

        for (i, beam) in decoded.beams.iter().enumerate() {
            let mut flag = BeamFlag::from_byte(beam.flag);
            if !flag.is_null() && (beam.bath.is_nan() || beam.across.is_nan() || beam.along.is_nan()) {
                warn!(
                    time_d = decoded.nav.time_d,
                    beam = i,
                    "NaN sounding set to null"
                );
                flag = BeamFlag::Null;
            }
            ping.flags[i] = flag;
            ping.original_flags[i] = flag;
            if !flag.is_null() {
                ping.bath[i] = beam.bath;
                ping.across[i] = beam.across;
                ping.along[i] = beam.along;
                ping.amp[i] = beam.amp;
            }
        }
        Ok(ping)
    }

    pub fn beam_count(&self) -> usize {
        self.flags.len()
    }

    pub fn key(&self) -> PingKey {
        PingKey {
            time_d: self.nav.time_d,
            multiplicity: self.multiplicity,
        }
    }

    pub fn raw_beam(&self, beam: usize) -> RawBeam {
        RawBeam {
            bath: self.bath[beam],
            across: self.across[beam],
            along: self.along[beam],
        }
    }

    /// Positions every non-null sounding under `bias`.
    pub fn correct(&mut self, async_nav: &AsyncNavigation, bias: &BiasParameters) {
        let attitude = attitude_for_ping(&self.nav, async_nav, bias);
        let scale = DegreeScale::at_latitude(self.nav.lat);
        for i in 0..self.beam_count() {
            if self.flags[i].is_null() {
                continue;
            }
            let c = correct_beam(
                &self.raw_beam(i),
                self.nav.sensor_depth,
                self.nav.lon,
                self.nav.lat,
                &scale,
                &attitude,
                bias.snell,
            );
            self.bathcorr[i] = c.bathcorr;
            self.lon[i] = c.lon;
            self.lat[i] = c.lat;
        }
    }

    /// Positions of every sounding under `bias` without touching the stored ones.
    pub fn corrected(&self, async_nav: &AsyncNavigation, bias: &BiasParameters) -> Vec<Option<CorrectedBeam>> {
        let attitude = attitude_for_ping(&self.nav, async_nav, bias);
        let scale = DegreeScale::at_latitude(self.nav.lat);
        (0..self.beam_count())
            .map(|i| {
                (!self.flags[i].is_null()).then(|| {
                    correct_beam(
                        &self.raw_beam(i),
                        self.nav.sensor_depth,
                        self.nav.lon,
                        self.nav.lat,
                        &scale,
                        &attitude,
                        bias.snell,
                    )
                })
            })
            .collect()
    }

    /// Projects the navigation and non-null soundings, returning how many soundings failed.
    pub fn project(&mut self, projection: &dyn Projection) -> usize {
        let (nx, ny) = projection
            .forward(self.nav.lon, self.nav.lat)
            .unwrap_or((f64::NAN, f64::NAN));
        self.nav_x = nx;
        self.nav_y = ny;

        let mut failures = 0;
        for i in 0..self.beam_count() {
            if self.flags[i].is_null() {
                continue;
            }
            match projection.forward(self.lon[i], self.lat[i]) {
                Some((x, y)) => {
                    self.x[i] = x;
                    self.y[i] = y;
                }
                None => {
                    self.x[i] = f64::NAN;
                    self.y[i] = f64::NAN;
                    failures += 1;
                }
            }
        }
        failures
    }

    /// The sounding as the grid sees it, or `None` when it has no usable position.
    pub fn sample(&self, beam: usize, beamwidth_across: f64, beamwidth_along: f64) -> Option<BeamSample> {
        let (x, y, depth) = (self.x[beam], self.y[beam], self.bathcorr[beam]);
        if self.flags[beam].is_null() || !(x.is_finite() && y.is_finite() && depth.is_finite()) {
            return None;
        }
        let footprint = Footprint::for_beam(
            (x, y),
            (self.nav_x, self.nav_y),
            depth - self.nav.sensor_depth,
            self.nav.altitude,
            beamwidth_across,
            beamwidth_along,
        );
        Some(BeamSample {
            x,
            y,
            depth,
            footprint,
        })
    }
}

/// A swath file known to the session, with its pings while loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SwathFile {
    pub path: Option<PathBuf>,
    pub name: String,
    pub beamwidth_across: f64,
    pub beamwidth_along: f64,
    pub async_nav: AsyncNavigation,
    pub pings: Vec<Ping>,
    pub extent: SurveyExtent,
    loaded: bool,
}

impl SwathFile {
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn ping_keys(&self) -> Vec<PingKey> {
        self.pings.iter().map(Ping::key).collect()
    }

    pub fn original_flags(&self) -> Vec<Vec<BeamFlag>> {
        self.pings.iter().map(|p| p.original_flags.clone()).collect()
    }

    pub fn current_flags(&self) -> Vec<Vec<BeamFlag>> {
        self.pings.iter().map(|p| p.flags.clone()).collect()
    }

    /// Replaces the current flags, keeping null soundings null.
    pub fn set_flags(&mut self, flags: Vec<Vec<BeamFlag>>) {
        for (ping, new) in self.pings.iter_mut().zip(flags) {
            for (current, flag) in ping.flags.iter_mut().zip(new) {
                if !current.is_null() || flag.is_null() {
                    *current = flag;
                }
            }
        }
    }

    /// Re-derives sounding positions under `bias` and recomputes the extent.
    pub fn correct(&mut self, bias: &BiasParameters) {
        let mut extent = SurveyExtent::default();
        for ping in self.pings.iter_mut() {
            ping.correct(&self.async_nav, bias);
            extent.include_altitude(ping.nav.altitude);
            for i in 0..ping.beam_count() {
                if !ping.flags[i].is_null() {
                    extent.include_sounding(ping.lon[i], ping.lat[i], ping.bathcorr[i]);
                }
            }
        }
        self.extent = extent;
    }

    pub fn project(&mut self, projection: &dyn Projection) -> usize {
        self.pings.iter_mut().map(|p| p.project(projection)).sum()
    }

    pub fn beam_count(&self) -> usize {
        self.pings.iter().map(Ping::beam_count).sum()
    }

    /// Every usable `Ok` sounding as a grid sample.
    pub fn ok_samples(&self) -> Vec<BeamSample> {
        self.pings
            .iter()
            .flat_map(|p| {
                (0..p.beam_count())
                    .filter(|&b| p.flags[b].is_ok())
                    .filter_map(|b| p.sample(b, self.beamwidth_across, self.beamwidth_along))
            })
            .collect()
    }
}

/// All swath files of a session, addressed by index.
#[derive(Debug, Clone, Default)]
pub struct FileSwathStore {
    files: Vec<SwathFile>,
}

impl FileSwathStore {
    pub fn new() -> Self {
        FileSwathStore::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn build_pings(decoded: &DecodedFile) -> Result<Vec<Ping>> {
        let mut pings: Vec<Ping> = Vec::new();
        pings
            .try_reserve_exact(decoded.pings.len())
            .map_err(|_| SwathEditError::AllocationFailed(format!("pings of {}", decoded.name)))?;
        for p in &decoded.pings {
            let ping = Ping::from_decoded(p, pings.last())?;
            pings.push(ping);
        }
        Ok(pings)
    }

    /// Adds a decoded file, positioning its soundings under `bias`. Returns the new file index.
    ///
    /// Nothing is added when memory for the file cannot be reserved.
    pub fn load(&mut self, decoded: DecodedFile, bias: &BiasParameters) -> Result<usize> {
        self.files
            .try_reserve(1)
            .map_err(|_| SwathEditError::AllocationFailed("file list".to_string()))?;
        let pings = FileSwathStore::build_pings(&decoded)?;
        let mut file = SwathFile {
            path: decoded.path,
            name: decoded.name,
            beamwidth_across: decoded.beamwidth_across,
            beamwidth_along: decoded.beamwidth_along,
            async_nav: decoded.async_nav,
            pings,
            extent: SurveyExtent::default(),
            loaded: true,
        };
        file.correct(bias);
        info!(
            file = %file.name,
            pings = file.pings.len(),
            beams = file.beam_count(),
            "swath file loaded"
        );
        self.files.push(file);
        Ok(self.files.len() - 1)
    }

    /// Refills the pings of a previously unloaded file.
    pub fn reload(&mut self, index: usize, decoded: &DecodedFile, bias: &BiasParameters) -> Result<()> {
        let pings = FileSwathStore::build_pings(decoded)?;
        let file = self.file_mut(index)?;
        file.pings = pings;
        file.async_nav = decoded.async_nav.clone();
        file.loaded = true;
        file.correct(bias);
        Ok(())
    }

    /// Releases every ping of a file, keeping the file entry.
    pub fn unload(&mut self, index: usize) -> Result<()> {
        let file = self.file_mut(index)?;
        file.pings = Vec::new();
        file.loaded = false;
        info!(file = %file.name, "swath file unloaded");
        Ok(())
    }

    /// Removes a file entirely; later files shift down by one.
    pub fn delete(&mut self, index: usize) -> Result<SwathFile> {
        if index >= self.files.len() {
            return Err(SwathEditError::FileIndex(index));
        }
        Ok(self.files.remove(index))
    }

    pub fn file(&self, index: usize) -> Result<&SwathFile> {
        self.files.get(index).ok_or(SwathEditError::FileIndex(index))
    }

    pub fn file_mut(&mut self, index: usize) -> Result<&mut SwathFile> {
        self.files
            .get_mut(index)
            .ok_or(SwathEditError::FileIndex(index))
    }

    pub fn files(&self) -> &[SwathFile] {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut [SwathFile] {
        &mut self.files
    }

    pub fn pings_of(&self, index: usize) -> Result<&[Ping]> {
        let file = self.file(index)?;
        if !file.loaded {
            return Err(SwathEditError::FileUnloaded(index));
        }
        Ok(&file.pings)
    }

    pub fn ping(&self, file: usize, ping: usize) -> Result<&Ping> {
        self.pings_of(file)?
            .get(ping)
            .ok_or(SwathEditError::PingIndex { file, ping })
    }

    pub fn ping_mut(&mut self, file: usize, ping: usize) -> Result<&mut Ping> {
        let entry = self.file_mut(file)?;
        if !entry.loaded {
            return Err(SwathEditError::FileUnloaded(file));
        }
        entry
            .pings
            .get_mut(ping)
            .ok_or(SwathEditError::PingIndex { file, ping })
    }

    /// Extent of every loaded file.
    pub fn extent(&self) -> SurveyExtent {
        self.files
            .iter()
            .filter(|f| f.loaded)
            .fold(SurveyExtent::default(), |acc, f| acc.merge(&f.extent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::bits;
    use crate::swath::decoded::DecodedBeam;
    use approx::assert_abs_diff_eq;

    fn decoded_ping(time_d: f64, beams: Vec<DecodedBeam>) -> DecodedPing {
        DecodedPing {
            nav: Navigation {
                time_d,
                lon: -70.0,
                lat: 42.0,
                altitude: 20.0,
                ..Default::default()
            },
            sensor_head: None,
            beams,
        }
    }

    fn beam(across: f64, flag: u8) -> DecodedBeam {
        DecodedBeam {
            bath: 20.0,
            across,
            along: 0.0,
            amp: 5.0,
            flag,
        }
    }

    #[test]
    fn nan_soundings_become_null() {
        let p = decoded_ping(
            1.0,
            vec![
                beam(0.0, bits::NONE),
                DecodedBeam {
                    bath: f64::NAN,
                    ..beam(1.0, bits::NONE)
                },
                DecodedBeam {
                    across: f64::NAN,
                    ..beam(1.0, bits::NULL)
                },
            ],
        );
        let ping = Ping::from_decoded(&p, None).unwrap();
        assert_eq!(ping.flags, vec![BeamFlag::Ok, BeamFlag::Null, BeamFlag::Null]);
        assert_eq!(ping.original_flags, ping.flags);
    }

    #[test]
    fn repeated_times_raise_multiplicity() {
        let a = Ping::from_decoded(&decoded_ping(10.0, vec![]), None).unwrap();
        let b = Ping::from_decoded(&decoded_ping(10.00005, vec![]), Some(&a)).unwrap();
        let c = Ping::from_decoded(&decoded_ping(11.0, vec![]), Some(&b)).unwrap();
        assert_eq!((a.multiplicity, b.multiplicity, c.multiplicity), (0, 1, 0));

        let mut headed = decoded_ping(11.0, vec![]);
        headed.sensor_head = Some(3);
        assert_eq!(Ping::from_decoded(&headed, Some(&c)).unwrap().multiplicity, 3);
    }

    #[test]
    fn load_unload_delete() {
        let mut store = FileSwathStore::new();
        let decoded = DecodedFile::new(
            "a",
            vec![decoded_ping(1.0, vec![beam(-5.0, bits::NONE), beam(5.0, bits::NONE)])],
        );
        let bias = BiasParameters::default();
        let a = store.load(decoded.clone(), &bias).unwrap();
        let b = store.load(DecodedFile::new("b", vec![]), &bias).unwrap();
        assert_eq!((a, b), (0, 1));

        let ping = store.ping(0, 0).unwrap();
        assert_abs_diff_eq!(ping.bathcorr[0], 20.0, epsilon = 1e-9);
        assert!(ping.lon[0] < -70.0 && ping.lon[1] > -70.0);
        assert!(store.extent().bounds.is_some());

        store.unload(0).unwrap();
        assert!(matches!(store.pings_of(0), Err(SwathEditError::FileUnloaded(0))));
        assert_eq!(store.len(), 2);
        assert!(store.extent().bounds.is_none());

        store.reload(0, &decoded, &bias).unwrap();
        assert_eq!(store.pings_of(0).unwrap().len(), 1);

        assert_eq!(store.delete(0).unwrap().name, "a");
        assert_eq!(store.file(0).unwrap().name, "b");
        assert!(matches!(store.delete(4), Err(SwathEditError::FileIndex(4))));
        assert!(matches!(
            store.ping(0, 0),
            Err(SwathEditError::PingIndex { file: 0, ping: 0 })
        ));
    }

    #[test]
    fn set_flags_keeps_nulls() {
        let mut store = FileSwathStore::new();
        let decoded = DecodedFile::new(
            "a",
            vec![decoded_ping(1.0, vec![beam(-5.0, bits::NONE), beam(5.0, bits::NULL)])],
        );
        store.load(decoded, &BiasParameters::default()).unwrap();
        let file = store.file_mut(0).unwrap();
        file.set_flags(vec![vec![BeamFlag::ManualFlag, BeamFlag::Ok]]);
        assert_eq!(file.pings[0].flags, vec![BeamFlag::ManualFlag, BeamFlag::Null]);
    }
}
