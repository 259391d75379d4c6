// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Pieces shared by the sender and receiver state machines

/// Outcome of a single state step
pub enum Transition<S: ?Sized> {
    /// Keep going from the given state
    Next(Box<S>),
    /// The transfer finished successfully
    Complete,
}

/// Short name of a typestate marker, for log and error context
pub(crate) fn state_name<S>() -> &'static str {
    let type_name = std::any::type_name::<S>();
    type_name.split("::").last().unwrap_or(type_name)
}
