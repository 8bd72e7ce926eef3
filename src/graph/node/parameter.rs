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

//! Control parameter nodes: the graph's named primary inputs, set once per
//! frame before evaluation.

use super::{
    GraphContext, GraphDefinition, GraphError, GraphValue, NodeArena, NodeIndex, ValueNodeOps,
};
use crate::StringId;
use nalgebra::Vector3;

macro_rules! define_parameter_node {
    ($(#[$meta:meta])* $name:ident, $value_ty:ty, $variant:ident, $expected:literal) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            index: NodeIndex,
            value: $value_ty,
        }

        impl $name {
            /// Creates the runtime node with its settings' default value.
            pub fn new(index: NodeIndex, default_value: $value_ty) -> Self {
                Self {
                    index,
                    value: default_value,
                }
            }

            /// The current parameter value.
            #[inline]
            pub fn get(&self) -> &$value_ty {
                &self.value
            }
        }

        impl ValueNodeOps for $name {
            fn index(&self) -> NodeIndex {
                self.index
            }

            fn initialize(&mut self) {}

            fn value(
                &mut self,
                _arena: &mut NodeArena,
                _definition: &GraphDefinition,
                _ctx: &mut GraphContext<'_>,
            ) -> Result<GraphValue, GraphError> {
                Ok(GraphValue::$variant(self.value.clone()))
            }

            fn set_value(&mut self, value: GraphValue) -> Result<(), GraphError> {
                match value {
                    GraphValue::$variant(value) => {
                        self.value = value;
                        Ok(())
                    }
                    _ => Err(GraphError::ValueTypeMismatch {
                        node: self.index,
                        expected: $expected,
                    }),
                }
            }
        }
    };
}

define_parameter_node!(
    /// A bool input, typically driving transition conditions.
    BoolParameterNode,
    bool,
    Bool,
    "bool"
);
define_parameter_node!(
    /// A float input, typically driving blend weights and speed scales.
    FloatParameterNode,
    f32,
    Float,
    "float"
);
define_parameter_node!(
    /// A name-hash input, compared against by [`super::IdComparisonNode`].
    IdParameterNode,
    StringId,
    Id,
    "id"
);
define_parameter_node!(
    /// A vector input, typically a desired velocity or facing.
    VectorParameterNode,
    Vector3<f32>,
    Vector,
    "vector"
);
