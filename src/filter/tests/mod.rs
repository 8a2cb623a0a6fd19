// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command filter tests
//!
//! Contains test suites for the classification pipeline:
//! - Pattern tests (regex, literal and sudo catalogs, allow-list)
//! - Sequence tests (separator splitting, multi-step idioms)
//! - Encoding tests (base64, hex and unicode payloads)
//! - Integration tests (ordering, rate limiting, strict mode)
