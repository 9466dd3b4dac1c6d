// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The layout of the array.

use serde::{Deserialize, Serialize};

use crate::coord::Xyz;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,

    /// ITRF position \[metres\]
    pub position: Xyz,

    /// Positions of the station's elements relative to `position`
    /// \[metres\]. Stations without elements have a flat array factor.
    #[serde(default)]
    pub elements: Vec<Xyz>,
}

impl Station {
    /// The unit vector pointing at the local zenith (geocentric).
    pub fn up(&self) -> [f64; 3] {
        let norm = self.position.norm();
        if norm == 0.0 {
            return [0.0, 0.0, 1.0];
        }
        [
            self.position.x / norm,
            self.position.y / norm,
            self.position.z / norm,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,

    /// ITRF reference position of the array \[metres\]
    pub position: Xyz,

    pub stations: Vec<Station>,
}

impl Instrument {
    pub fn n_stations(&self) -> usize {
        self.stations.len()
    }

    pub fn station(&self, i: usize) -> &Station {
        &self.stations[i]
    }

    pub fn position(&self) -> Xyz {
        self.position
    }
}
