use crate::flags::BeamFlag;
use crate::geometry::attitude::BiasParameters;
use crate::projection::Projection;
use crate::swath::store::FileSwathStore;
use crate::utils::constants::{DTR, RTD};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Part of the survey to pull soundings from, in projected coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// Axis-aligned box around four corner points
    Quad { corners: [(f64, f64); 4] },
    /// Rectangle of `width` centered on the segment between two endpoints
    Area {
        endpoints: [(f64, f64); 2],
        width: f64,
    },
    /// Every sounding of the listed `(file, ping)` pairs
    Nav { pings: Vec<(usize, usize)> },
}

/// A sounding pulled into a selection, positioned relative to the selection origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedSounding {
    pub file: usize,
    pub ping: usize,
    pub beam: usize,
    /// Along the selection bearing
    pub x: f64,
    /// Across the selection bearing
    pub y: f64,
    /// Elevation relative to `zorigin`
    pub z: f64,
    pub flag: BeamFlag,
    pub original_flag: BeamFlag,
    pub amp: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionBuffer {
    pub soundings: Vec<SelectedSounding>,
    pub xorigin: f64,
    pub yorigin: f64,
    pub zorigin: f64,
    /// Degrees clockwise from north
    pub bearing: f64,
    sinb: f64,
    cosb: f64,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub zmin: f64,
    pub zmax: f64,
    pub scale: f64,
    pub zscale: f64,
    /// Soundings left out because they could not be projected
    pub projection_failures: usize,
    index: HashMap<(usize, usize, usize), usize>,
}

/// Plot scale for a selection whose bounds span `diagonal` meters.
fn scale_for(diagonal: f64) -> f64 {
    if diagonal > 0.0 && diagonal.is_finite() {
        2.0 / diagonal
    } else {
        1.0
    }
}

impl SelectionBuffer {
    pub(crate) fn with_frame(xorigin: f64, yorigin: f64, bearing: f64) -> Self {
        let (sinb, cosb) = (DTR * bearing).sin_cos();
        SelectionBuffer {
            xorigin,
            yorigin,
            bearing,
            sinb,
            cosb,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.soundings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soundings.is_empty()
    }

    pub fn num_unflagged(&self) -> usize {
        self.soundings.iter().filter(|s| s.flag.is_ok()).count()
    }

    pub fn num_flagged(&self) -> usize {
        self.len() - self.num_unflagged()
    }

    /// Position of a projected point in the selection frame.
    pub fn to_local(&self, x: f64, y: f64) -> (f64, f64) {
        let x = x - self.xorigin;
        let y = y - self.yorigin;
        (x * self.sinb + y * self.cosb, -x * self.cosb + y * self.sinb)
    }

    pub fn find(&self, file: usize, ping: usize, beam: usize) -> Option<usize> {
        self.index.get(&(file, ping, beam)).copied()
    }

    /// Updates the flag of a selected sounding, returning whether it was selected.
    pub fn set_flag(&mut self, file: usize, ping: usize, beam: usize, flag: BeamFlag) -> bool {
        match self.find(file, ping, beam) {
            Some(i) => {
                self.soundings[i].flag = flag;
                true
            }
            None => false,
        }
    }

    fn push(&mut self, sounding: SelectedSounding) {
        self.index
            .insert((sounding.file, sounding.ping, sounding.beam), self.soundings.len());
        self.soundings.push(sounding);
    }

    /// Re-centers z about the middle of its range and sets the z scale.
    fn finish_z(&mut self) {
        let (zmin, zmax) = self
            .soundings
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.z), hi.max(s.z))
            });
        if self.soundings.is_empty() {
            self.zorigin = 0.0;
            self.zmin = 0.0;
            self.zmax = 0.0;
        } else {
            self.zorigin = 0.5 * (zmin + zmax);
            self.zmin = -0.5 * (zmax - zmin);
            self.zmax = 0.5 * (zmax - zmin);
            for s in self.soundings.iter_mut() {
                s.z -= self.zorigin;
            }
        }
        self.zscale = self.scale;
    }

    /// Recomputes every selected position under `bias` without regridding.
    pub fn rebias(&mut self, store: &FileSwathStore, bias: &BiasParameters, projection: &dyn Projection) {
        let mut last: Option<(usize, usize)> = None;
        let mut corrected = vec![];
        for i in 0..self.soundings.len() {
            let s = self.soundings[i];
            let Ok(file) = store.file(s.file) else {
                continue;
            };
            let Some(ping) = file.pings.get(s.ping) else {
                continue;
            };
            if last != Some((s.file, s.ping)) {
                corrected = ping.corrected(&file.async_nav, bias);
                last = Some((s.file, s.ping));
            }
            let Some(c) = corrected.get(s.beam).copied().flatten() else {
                continue;
            };
            match projection.forward(c.lon, c.lat) {
                Some((x, y)) => {
                    let (xx, yy) = self.to_local(x, y);
                    let z = -c.bathcorr;
                    let s = &mut self.soundings[i];
                    s.x = xx;
                    s.y = yy;
                    s.z = z;
                }
                None => warn!(file = s.file, ping = s.ping, beam = s.beam, "projection failed"),
            }
        }
        self.finish_z();
    }
}

/// Whether a projected point lies inside the region of a selection.
type Containment = Box<dyn Fn(&SelectionBuffer, f64, f64) -> bool>;

fn bounding_box(points: impl Iterator<Item = (f64, f64)>) -> Option<(f64, f64, f64, f64)> {
    points.fold(None, |acc, (x, y)| match acc {
        None => Some((x, x, y, y)),
        Some((x0, x1, y0, y1)) => Some((x0.min(x), x1.max(x), y0.min(y), y1.max(y))),
    })
}

/// Pulls soundings inside `region` into a new selection, positioned under `bias`.
///
/// Null soundings are never selected, secondary picks only with `include_secondary`.
pub fn select(
    store: &FileSwathStore,
    region: &Region,
    bias: &BiasParameters,
    projection: &dyn Projection,
    include_secondary: bool,
) -> SelectionBuffer {
    let (mut buffer, contains): (SelectionBuffer, Containment) =
        match region {
            Region::Quad { corners } => {
                let (xmin, xmax, ymin, ymax) =
                    bounding_box(corners.iter().copied()).unwrap_or_default();
                let mut b = SelectionBuffer::with_frame(0.5 * (xmin + xmax), 0.5 * (ymin + ymax), 90.0);
                b.xmin = -0.5 * (xmax - xmin);
                b.xmax = 0.5 * (xmax - xmin);
                b.ymin = -0.5 * (ymax - ymin);
                b.ymax = 0.5 * (ymax - ymin);
                b.scale = scale_for((xmax - xmin).hypot(ymax - ymin));
                let test: Containment = Box::new(move |_: &SelectionBuffer, x: f64, y: f64| {
                    x >= xmin && x <= xmax && y >= ymin && y <= ymax
                });
                (b, test)
            }
            Region::Area { endpoints, width } => {
                let [(x0, y0), (x1, y1)] = *endpoints;
                let length = (x1 - x0).hypot(y1 - y0);
                let bearing = RTD * (x1 - x0).atan2(y1 - y0);
                let mut b = SelectionBuffer::with_frame(0.5 * (x0 + x1), 0.5 * (y0 + y1), bearing);
                b.xmin = -0.5 * length;
                b.xmax = 0.5 * length;
                b.ymin = -0.5 * width;
                b.ymax = 0.5 * width;
                b.scale = scale_for(length.hypot(*width));
                let test: Containment = Box::new(|frame: &SelectionBuffer, x: f64, y: f64| {
                    let (xx, yy) = frame.to_local(x, y);
                    xx >= frame.xmin && xx <= frame.xmax && yy >= frame.ymin && yy <= frame.ymax
                });
                (b, test)
            }
            Region::Nav { .. } => {
                let test: Containment = Box::new(|_: &SelectionBuffer, _: f64, _: f64| true);
                (SelectionBuffer::with_frame(0.0, 0.0, 90.0), test)
            }
        };

    let nav_pings: Option<Vec<(usize, usize)>> = match region {
        Region::Nav { pings } => {
            let mut p = pings.clone();
            p.sort_unstable();
            p.dedup();
            Some(p)
        }
        _ => None,
    };

    // absolute projected positions, made local once the frame is final
    let mut absolute: Vec<(f64, f64)> = vec![];
    for (ifile, file) in store.files().iter().enumerate() {
        if !file.is_loaded() {
            continue;
        }
        for (iping, ping) in file.pings.iter().enumerate() {
            if let Some(p) = &nav_pings {
                if p.binary_search(&(ifile, iping)).is_err() {
                    continue;
                }
            }
            if !(0..ping.beam_count()).any(|b| ping.flags[b].is_selectable(include_secondary)) {
                continue;
            }
            let corrected = ping.corrected(&file.async_nav, bias);
            for (ibeam, c) in corrected.iter().enumerate() {
                let flag = ping.flags[ibeam];
                if !flag.is_selectable(include_secondary) {
                    continue;
                }
                let Some(c) = c else {
                    continue;
                };
                let Some((x, y)) = projection.forward(c.lon, c.lat) else {
                    buffer.projection_failures += 1;
                    continue;
                };
                if !contains(&buffer, x, y) {
                    continue;
                }
                absolute.push((x, y));
                buffer.push(SelectedSounding {
                    file: ifile,
                    ping: iping,
                    beam: ibeam,
                    x,
                    y,
                    z: -c.bathcorr,
                    flag,
                    original_flag: ping.original_flags[ibeam],
                    amp: ping.amp[ibeam],
                });
            }
        }
    }

    if nav_pings.is_some() {
        if let Some((xmin, xmax, ymin, ymax)) = bounding_box(absolute.iter().copied()) {
            buffer.xorigin = 0.5 * (xmin + xmax);
            buffer.yorigin = 0.5 * (ymin + ymax);
            buffer.xmin = -0.5 * (xmax - xmin);
            buffer.xmax = 0.5 * (xmax - xmin);
            buffer.ymin = -0.5 * (ymax - ymin);
            buffer.ymax = 0.5 * (ymax - ymin);
            buffer.scale = scale_for((xmax - xmin).hypot(ymax - ymin));
        }
    }
    for (s, &(x, y)) in buffer.soundings.iter_mut().zip(&absolute) {
        let x = x - buffer.xorigin;
        let y = y - buffer.yorigin;
        s.x = x * buffer.sinb + y * buffer.cosb;
        s.y = -x * buffer.cosb + y * buffer.sinb;
    }
    buffer.finish_z();

    if buffer.projection_failures > 0 {
        warn!(count = buffer.projection_failures, "soundings could not be projected");
    }
    debug!(
        selected = buffer.len(),
        unflagged = buffer.num_unflagged(),
        flagged = buffer.num_flagged(),
        "selection made"
    );
    buffer
}
