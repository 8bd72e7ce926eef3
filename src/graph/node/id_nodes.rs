// Copyright (c) 2024-present Arclight Animation contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! ID expression nodes.

use super::{
    GraphContext, GraphDefinition, GraphError, GraphValue, NodeArena, NodeIndex, ValueNodeOps,
};

/// True iff an ID input equals the settings' ID.
#[derive(Debug)]
pub struct IdComparisonNode {
    index: NodeIndex,
    cached: Option<(u64, bool)>,
}

impl IdComparisonNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            cached: None,
        }
    }
}

impl ValueNodeOps for IdComparisonNode {
    fn index(&self) -> NodeIndex {
        self.index
    }

    fn initialize(&mut self) {
        self.cached = None;
    }

    fn value(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<GraphValue, GraphError> {
        if let Some((update_id, value)) = self.cached {
            if update_id == ctx.update_id {
                return Ok(GraphValue::Bool(value));
            }
        }
        let settings = definition.id_comparison_settings(self.index)?;
        let (input, compare_to) = (settings.input, settings.compare_to);
        let value = super::get_id(input, arena, definition, ctx)? == compare_to;
        self.cached = Some((ctx.update_id, value));
        Ok(GraphValue::Bool(value))
    }
}
