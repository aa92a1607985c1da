// actiontag - a parser for action tags in form field annotations.
// Copyright (C) 2025 The actiontag authors.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

#![no_main]

use actiontag::parse::parse;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let segments = parse(input);
        // The segments must cover the input exactly, in order.
        let len = input.chars().count();
        let mut next = 0;
        for segment in &segments {
            let span = segment.span();
            assert_eq!(span.start, next);
            assert!(span.end >= span.start);
            next = span.end + 1;
        }
        assert_eq!(next, len);
    }
});
