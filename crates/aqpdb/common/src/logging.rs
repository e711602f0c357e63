// AqpDB
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use tracing::Level;

/// Installs a fmt subscriber at the given level. Calling it again is a no-op,
/// so tests and binaries can both call it freely.
pub fn init_tracing(level: Level) {
    if tracing_subscriber::fmt().with_max_level(level).with_target(false).try_init().is_ok() {
        tracing::debug!("Tracing initialized at {}", level);
    }
}
