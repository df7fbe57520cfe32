// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

pub const SYSTEM: &str = "You are an experienced data analyst. You explain charts to readers \
who cannot see them, using only the chart description you are given.";

const SECTIONS: &str = "\
Structure the explanation with these sections:
1. Overview: what the chart shows and which variables are plotted
2. Key Features: notable values, ranges, peaks, outliers and clusters
3. Insights and Patterns: relationships, trends and comparisons between groups
4. Conclusion: the main takeaway in one or two sentences";

pub fn initial(request: &str, chart: &str) -> String {
    format!(
        "{request}\n\nChart description:\n{chart}\n\n{SECTIONS}\n\n\
         Base every statement on the description. Do not invent values that are not listed."
    )
}

pub fn critique(request: &str, chart: &str, explanation: &str) -> String {
    format!(
        "Review this explanation of a chart.\n\nChart description:\n{chart}\n\n\
         Original request:\n{request}\n\nExplanation:\n{explanation}\n\n\
         Assess each section:\n\
         - Overview: is the chart described clearly and concisely?\n\
         - Key Features: are the important values and shapes covered accurately?\n\
         - Insights and Patterns: are meaningful relationships identified?\n\
         - Conclusion: does it follow from the evidence?\n\n\
         List concrete errors, omissions and unsupported claims. \
         Provide a constructive critique that will help refine the explanation."
    )
}

pub fn refinement(request: &str, chart: &str, explanation: &str, critique: &str) -> String {
    format!(
        "Improve this explanation of a chart using the critique.\n\nChart description:\n{chart}\n\n\
         Original request:\n{request}\n\nCurrent explanation:\n{explanation}\n\n\
         Critique:\n{critique}\n\n\
         Address every point in the critique while keeping what is already correct.\n\n{SECTIONS}\n\n\
         Reply with the refined explanation only."
    )
}
