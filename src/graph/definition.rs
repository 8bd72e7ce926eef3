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

//! Compiled graph definitions: the immutable, shareable settings of every
//! node, the dataset descriptor and the root index.
//!
//! A definition is produced by an offline compiler and consumed here. The
//! wire format is little-endian throughout: magic `"agdf"`, a version, the
//! node count, then one `u16` tag + `u16` reserved + variant payload per
//! node, the dataset descriptor block and finally the root node index. Node
//! references are `u32` with `0xFFFF_FFFF` meaning "not connected"; names are
//! stored as 64-bit hashes.

use crate::{
    dataset::DatasetDescriptor, error::GraphError, mask::BoneMask, NodeIndex, Seconds,
    StringId, INVALID_INDEX,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use strum_macros::{AsRefStr, FromRepr};

/// Magic prefix of a serialized graph definition.
pub const DEFINITION_MAGIC: &[u8; 4] = b"agdf";

/// Current version of the wire format.
pub const DEFINITION_VERSION: u32 = 1;

/// Wire tag identifying a node settings variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromRepr, AsRefStr)]
#[repr(u16)]
pub enum NodeTag {
    /// [`AnimationClipSettings`]
    AnimationClip = 0,
    /// [`BlendSettings`]
    Blend = 1,
    /// [`PassthroughSettings`]
    Passthrough = 2,
    /// [`StateSettings`]
    State = 3,
    /// [`TransitionSettings`]
    Transition = 4,
    /// [`StateMachineSettings`]
    StateMachine = 5,
    /// [`SpeedScaleSettings`]
    SpeedScale = 6,
    /// [`RootMotionOverrideSettings`]
    RootMotionOverride = 7,
    /// [`BoolParameterSettings`]
    BoolParameter = 8,
    /// [`FloatParameterSettings`]
    FloatParameter = 9,
    /// [`IdParameterSettings`]
    IdParameter = 10,
    /// [`VectorParameterSettings`]
    VectorParameter = 11,
    /// [`BoolAndSettings`]
    BoolAnd = 12,
    /// [`BoolOrSettings`]
    BoolOr = 13,
    /// [`BoolNotSettings`]
    BoolNot = 14,
    /// [`FloatClampSettings`]
    FloatClamp = 15,
    /// [`IdComparisonSettings`]
    IdComparison = 16,
    /// [`EventConditionSettings`]
    EventCondition = 17,
}

bitflags::bitflags! {
    /// How a blend combines its inputs. Only interpolative blending is
    /// implemented; the additive bit is reserved and rejected at load.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct BlendOptions: u32 {
        /// Standard interpolative blend.
        const INTERPOLATIVE = 1 << 0;
        /// Reserved for additive blending.
        const ADDITIVE = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Which root-motion components a [`RootMotionOverrideSettings`] node
    /// replaces.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct RootMotionOverrideFlags: u32 {
        /// Override the X component of the heading velocity.
        const HEADING_X = 1 << 0;
        /// Override the Y component of the heading velocity.
        const HEADING_Y = 1 << 1;
        /// Override the Z component of the heading velocity.
        const HEADING_Z = 1 << 2;
        /// Override the X component of the facing direction.
        const FACING_X = 1 << 3;
        /// Override the Y component of the facing direction.
        const FACING_Y = 1 << 4;
        /// Override the Z component of the facing direction.
        const FACING_Z = 1 << 5;
    }
}

impl RootMotionOverrideFlags {
    /// Any heading axis selected.
    #[inline]
    pub fn overrides_heading(&self) -> bool {
        self.intersects(Self::HEADING_X | Self::HEADING_Y | Self::HEADING_Z)
    }

    /// Any facing axis selected.
    #[inline]
    pub fn overrides_facing(&self) -> bool {
        self.intersects(Self::FACING_X | Self::FACING_Y | Self::FACING_Z)
    }
}

/// Settings of a leaf clip-sampling node.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClipSettings {
    /// Slot in the dataset to resolve the clip from.
    pub data_slot: u32,
    /// Optional bool value node; when it reads true the clip plays backwards.
    pub play_in_reverse: Option<NodeIndex>,
}

/// Settings of a two-way synchronized blend node.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendSettings {
    /// Pose child blended from.
    pub source: NodeIndex,
    /// Pose child blended towards.
    pub target: NodeIndex,
    /// Float value node producing the blend weight.
    pub weight: NodeIndex,
    /// Blend behavior flags.
    pub options: BlendOptions,
    /// Optional per-bone weight mask baked into the definition.
    pub bone_mask: Option<BoneMask>,
}

/// Settings of a plain passthrough node.
#[derive(Clone, Debug, PartialEq)]
pub struct PassthroughSettings {
    /// The wrapped pose child.
    pub child: NodeIndex,
}

/// Settings of a state node.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSettings {
    /// The pose child backing the state.
    pub child: NodeIndex,
    /// State event sampled while the state is entered; [`StringId::NONE`]
    /// for none.
    pub entry_event: StringId,
    /// State event sampled while the state is left.
    pub exit_event: StringId,
}

/// Settings of a transition node.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionSettings {
    /// The state node the transition fades into.
    pub target_state: NodeIndex,
    /// Cross-fade duration in seconds.
    pub duration: Seconds,
}

/// One outgoing transition of a state, as stored in a state machine.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionRef {
    /// The transition node performing the cross-fade.
    pub transition_node: NodeIndex,
    /// Bool value node deciding when the transition fires.
    pub condition: NodeIndex,
    /// Index of the target state in the machine's state list.
    pub target_state_index: u16,
}

/// One state of a state machine: its state node plus its outgoing
/// transitions, in declaration (= arbitration) order.
#[derive(Clone, Debug, PartialEq)]
pub struct StateRef {
    /// The state node.
    pub state_node: NodeIndex,
    /// Outgoing transitions; the first whose condition holds wins.
    pub transitions: Vec<TransitionRef>,
}

/// Settings of a state machine node.
#[derive(Clone, Debug, PartialEq)]
pub struct StateMachineSettings {
    /// The machine's states. State zero is the entry state.
    pub states: Vec<StateRef>,
}

/// Settings of a speed-scaling passthrough node.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedScaleSettings {
    /// The wrapped pose child.
    pub child: NodeIndex,
    /// Optional float value node producing the playback scale; absent means
    /// a constant scale of one.
    pub scale: Option<NodeIndex>,
    /// Seconds over which a new scale blends in from one.
    pub blend_time: Seconds,
}

/// Settings of a root-motion override passthrough node.
#[derive(Clone, Debug, PartialEq)]
pub struct RootMotionOverrideSettings {
    /// The wrapped pose child.
    pub child: NodeIndex,
    /// Vector value node producing the desired heading velocity.
    pub heading_velocity: Option<NodeIndex>,
    /// Vector value node producing the desired facing direction.
    pub facing_direction: Option<NodeIndex>,
    /// Optional float value node overriding the linear velocity budget.
    pub velocity_limit: Option<NodeIndex>,
    /// Which components get replaced.
    pub flags: RootMotionOverrideFlags,
    /// Linear velocity budget (units per second) when no limit node is wired.
    pub max_linear_velocity: f32,
}

/// Settings of a bool control parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolParameterSettings {
    /// Hashed parameter name.
    pub name: StringId,
    /// Value before the first `set_parameter`.
    pub default_value: bool,
}

/// Settings of a float control parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatParameterSettings {
    /// Hashed parameter name.
    pub name: StringId,
    /// Value before the first `set_parameter`.
    pub default_value: f32,
}

/// Settings of an ID control parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct IdParameterSettings {
    /// Hashed parameter name.
    pub name: StringId,
    /// Value before the first `set_parameter`.
    pub default_value: StringId,
}

/// Settings of a vector control parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorParameterSettings {
    /// Hashed parameter name.
    pub name: StringId,
    /// Value before the first `set_parameter`.
    pub default_value: [f32; 3],
}

/// Settings of a logical AND over two bool value nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolAndSettings {
    /// Left input.
    pub input_a: NodeIndex,
    /// Right input.
    pub input_b: NodeIndex,
}

/// Settings of a logical OR over two bool value nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolOrSettings {
    /// Left input.
    pub input_a: NodeIndex,
    /// Right input.
    pub input_b: NodeIndex,
}

/// Settings of a logical NOT over a bool value node.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolNotSettings {
    /// The negated input.
    pub input: NodeIndex,
}

/// Settings of a float clamp.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatClampSettings {
    /// Float input node.
    pub input: NodeIndex,
    /// Lower clamp bound.
    pub min: f32,
    /// Upper clamp bound.
    pub max: f32,
}

/// Settings of an ID equality check.
#[derive(Clone, Debug, PartialEq)]
pub struct IdComparisonSettings {
    /// ID input node.
    pub input: NodeIndex,
    /// The ID compared against.
    pub compare_to: StringId,
}

/// Settings of a sampled-state-event check.
#[derive(Clone, Debug, PartialEq)]
pub struct EventConditionSettings {
    /// The state event looked for in the sampled-events buffer.
    pub event: StringId,
}

/// The settings of one node, tagged by variant.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeSettings {
    /// Leaf clip sampler.
    AnimationClip(AnimationClipSettings),
    /// Two-way synchronized blend.
    Blend(BlendSettings),
    /// Plain passthrough.
    Passthrough(PassthroughSettings),
    /// State of a state machine.
    State(StateSettings),
    /// Cross-fade between states.
    Transition(TransitionSettings),
    /// State machine.
    StateMachine(StateMachineSettings),
    /// Playback speed scaling.
    SpeedScale(SpeedScaleSettings),
    /// Root-motion replacement.
    RootMotionOverride(RootMotionOverrideSettings),
    /// Bool control parameter.
    BoolParameter(BoolParameterSettings),
    /// Float control parameter.
    FloatParameter(FloatParameterSettings),
    /// ID control parameter.
    IdParameter(IdParameterSettings),
    /// Vector control parameter.
    VectorParameter(VectorParameterSettings),
    /// Logical AND.
    BoolAnd(BoolAndSettings),
    /// Logical OR.
    BoolOr(BoolOrSettings),
    /// Logical NOT.
    BoolNot(BoolNotSettings),
    /// Float clamp.
    FloatClamp(FloatClampSettings),
    /// ID equality.
    IdComparison(IdComparisonSettings),
    /// Sampled-state-event check.
    EventCondition(EventConditionSettings),
}

impl NodeSettings {
    /// Wire tag of the variant.
    pub fn tag(&self) -> NodeTag {
        match self {
            NodeSettings::AnimationClip(_) => NodeTag::AnimationClip,
            NodeSettings::Blend(_) => NodeTag::Blend,
            NodeSettings::Passthrough(_) => NodeTag::Passthrough,
            NodeSettings::State(_) => NodeTag::State,
            NodeSettings::Transition(_) => NodeTag::Transition,
            NodeSettings::StateMachine(_) => NodeTag::StateMachine,
            NodeSettings::SpeedScale(_) => NodeTag::SpeedScale,
            NodeSettings::RootMotionOverride(_) => NodeTag::RootMotionOverride,
            NodeSettings::BoolParameter(_) => NodeTag::BoolParameter,
            NodeSettings::FloatParameter(_) => NodeTag::FloatParameter,
            NodeSettings::IdParameter(_) => NodeTag::IdParameter,
            NodeSettings::VectorParameter(_) => NodeTag::VectorParameter,
            NodeSettings::BoolAnd(_) => NodeTag::BoolAnd,
            NodeSettings::BoolOr(_) => NodeTag::BoolOr,
            NodeSettings::BoolNot(_) => NodeTag::BoolNot,
            NodeSettings::FloatClamp(_) => NodeTag::FloatClamp,
            NodeSettings::IdComparison(_) => NodeTag::IdComparison,
            NodeSettings::EventCondition(_) => NodeTag::EventCondition,
        }
    }

    /// Returns `true` when the node produces a pose (and a task handle)
    /// rather than a value.
    pub fn is_pose_node(&self) -> bool {
        matches!(
            self,
            NodeSettings::AnimationClip(_)
                | NodeSettings::Blend(_)
                | NodeSettings::Passthrough(_)
                | NodeSettings::State(_)
                | NodeSettings::Transition(_)
                | NodeSettings::StateMachine(_)
                | NodeSettings::SpeedScale(_)
                | NodeSettings::RootMotionOverride(_)
        )
    }

    /// Every node index the settings reference, used for bounds validation.
    pub fn referenced_nodes(&self) -> Vec<NodeIndex> {
        let mut refs = Vec::new();
        match self {
            NodeSettings::AnimationClip(s) => refs.extend(s.play_in_reverse),
            NodeSettings::Blend(s) => refs.extend([s.source, s.target, s.weight]),
            NodeSettings::Passthrough(s) => refs.push(s.child),
            NodeSettings::State(s) => refs.push(s.child),
            NodeSettings::Transition(s) => refs.push(s.target_state),
            NodeSettings::StateMachine(s) => {
                for state in &s.states {
                    refs.push(state.state_node);
                    for transition in &state.transitions {
                        refs.push(transition.transition_node);
                        refs.push(transition.condition);
                    }
                }
            }
            NodeSettings::SpeedScale(s) => {
                refs.push(s.child);
                refs.extend(s.scale);
            }
            NodeSettings::RootMotionOverride(s) => {
                refs.push(s.child);
                refs.extend(s.heading_velocity);
                refs.extend(s.facing_direction);
                refs.extend(s.velocity_limit);
            }
            NodeSettings::BoolParameter(_)
            | NodeSettings::FloatParameter(_)
            | NodeSettings::IdParameter(_)
            | NodeSettings::VectorParameter(_)
            | NodeSettings::EventCondition(_) => {}
            NodeSettings::BoolAnd(s) => refs.extend([s.input_a, s.input_b]),
            NodeSettings::BoolOr(s) => refs.extend([s.input_a, s.input_b]),
            NodeSettings::BoolNot(s) => refs.push(s.input),
            NodeSettings::FloatClamp(s) => refs.push(s.input),
            NodeSettings::IdComparison(s) => refs.push(s.input),
        }
        refs
    }
}

/// An immutable compiled animation graph, shared by every instance driving a
/// character with it.
#[derive(Debug)]
pub struct GraphDefinition {
    nodes: Vec<NodeSettings>,
    dataset: DatasetDescriptor,
    root: NodeIndex,
}

macro_rules! settings_accessor {
    ($(#[$meta:meta])* $name:ident, $variant:ident, $settings:ty) => {
        $(#[$meta])*
        pub fn $name(&self, node: NodeIndex) -> Result<&$settings, GraphError> {
            match self.node(node)? {
                NodeSettings::$variant(settings) => Ok(settings),
                _ => Err(GraphError::NodeTypeMismatch { node }),
            }
        }
    };
}

impl GraphDefinition {
    /// Builds a definition from already-deserialized parts, validating node
    /// references.
    pub fn new(
        nodes: Vec<NodeSettings>,
        dataset: DatasetDescriptor,
        root: NodeIndex,
    ) -> Result<Self, GraphError> {
        let definition = Self {
            nodes,
            dataset,
            root,
        };
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<(), GraphError> {
        let count = self.nodes.len();
        if count == 0 {
            return Err(GraphError::InvalidDefinition("graph has no nodes".into()));
        }
        if (self.root as usize) >= count {
            return Err(GraphError::NodeIndexOutOfBounds {
                node: self.root,
                count,
            });
        }
        if !self.nodes[self.root as usize].is_pose_node() {
            return Err(GraphError::InvalidDefinition(format!(
                "root node {} is not a pose node",
                self.root
            )));
        }
        for (index, settings) in self.nodes.iter().enumerate() {
            for reference in settings.referenced_nodes() {
                if (reference as usize) >= count {
                    return Err(GraphError::NodeIndexOutOfBounds {
                        node: reference,
                        count,
                    });
                }
            }
            if let NodeSettings::Blend(blend) = settings {
                if blend.options.contains(BlendOptions::ADDITIVE) {
                    return Err(GraphError::InvalidDefinition(format!(
                        "node {index}: additive blending is not implemented"
                    )));
                }
            }
            if let NodeSettings::StateMachine(machine) = settings {
                if machine.states.is_empty() {
                    return Err(GraphError::InvalidDefinition(format!(
                        "state machine {index} has no states"
                    )));
                }
                for state in &machine.states {
                    for transition in &state.transitions {
                        if (transition.target_state_index as usize) >= machine.states.len() {
                            return Err(GraphError::InvalidDefinition(format!(
                                "state machine {index}: transition targets state {} of {}",
                                transition.target_state_index,
                                machine.states.len()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The settings of every node, in index order.
    #[inline]
    pub fn nodes(&self) -> &[NodeSettings] {
        &self.nodes
    }

    /// The root pose node.
    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// The dataset descriptor the graph was compiled against.
    #[inline]
    pub fn dataset_descriptor(&self) -> &DatasetDescriptor {
        &self.dataset
    }

    /// Borrows a node's settings.
    pub fn node(&self, node: NodeIndex) -> Result<&NodeSettings, GraphError> {
        self.nodes
            .get(node as usize)
            .ok_or(GraphError::NodeIndexOutOfBounds {
                node,
                count: self.nodes.len(),
            })
    }

    settings_accessor!(
        /// Typed access to an animation clip node's settings.
        animation_clip_settings,
        AnimationClip,
        AnimationClipSettings
    );
    settings_accessor!(
        /// Typed access to a blend node's settings.
        blend_settings,
        Blend,
        BlendSettings
    );
    settings_accessor!(
        /// Typed access to a passthrough node's settings.
        passthrough_settings,
        Passthrough,
        PassthroughSettings
    );
    settings_accessor!(
        /// Typed access to a state node's settings.
        state_settings,
        State,
        StateSettings
    );
    settings_accessor!(
        /// Typed access to a transition node's settings.
        transition_settings,
        Transition,
        TransitionSettings
    );
    settings_accessor!(
        /// Typed access to a state machine node's settings.
        state_machine_settings,
        StateMachine,
        StateMachineSettings
    );
    settings_accessor!(
        /// Typed access to a speed scale node's settings.
        speed_scale_settings,
        SpeedScale,
        SpeedScaleSettings
    );
    settings_accessor!(
        /// Typed access to a root motion override node's settings.
        root_motion_override_settings,
        RootMotionOverride,
        RootMotionOverrideSettings
    );
    settings_accessor!(
        /// Typed access to a float clamp node's settings.
        float_clamp_settings,
        FloatClamp,
        FloatClampSettings
    );
    settings_accessor!(
        /// Typed access to an ID comparison node's settings.
        id_comparison_settings,
        IdComparison,
        IdComparisonSettings
    );
    settings_accessor!(
        /// Typed access to an event condition node's settings.
        event_condition_settings,
        EventCondition,
        EventConditionSettings
    );
    settings_accessor!(
        /// Typed access to a bool AND node's settings.
        bool_and_settings,
        BoolAnd,
        BoolAndSettings
    );
    settings_accessor!(
        /// Typed access to a bool OR node's settings.
        bool_or_settings,
        BoolOr,
        BoolOrSettings
    );
    settings_accessor!(
        /// Typed access to a bool NOT node's settings.
        bool_not_settings,
        BoolNot,
        BoolNotSettings
    );

    /// Reads a definition from its wire form.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, GraphError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != DEFINITION_MAGIC {
            return Err(GraphError::InvalidDefinition(format!(
                "bad definition magic {magic:?}"
            )));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != DEFINITION_VERSION {
            return Err(GraphError::InvalidDefinition(format!(
                "unsupported definition version {version}"
            )));
        }

        let node_count = reader.read_u32::<LittleEndian>()?;
        let mut nodes = Vec::with_capacity(node_count as usize);
        for index in 0..node_count {
            let raw_tag = reader.read_u16::<LittleEndian>()?;
            let _reserved = reader.read_u16::<LittleEndian>()?;
            let tag = NodeTag::from_repr(raw_tag).ok_or_else(|| {
                GraphError::InvalidDefinition(format!("node {index}: unknown tag {raw_tag}"))
            })?;
            nodes.push(read_node_settings(reader, tag)?);
        }

        let dataset = DatasetDescriptor::read(reader)?;
        let root = reader.read_u32::<LittleEndian>()?;
        Self::new(nodes, dataset, root)
    }

    /// Writes the definition in its wire form.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(DEFINITION_MAGIC)?;
        writer.write_u32::<LittleEndian>(DEFINITION_VERSION)?;
        writer.write_u32::<LittleEndian>(self.nodes.len() as u32)?;
        for settings in &self.nodes {
            writer.write_u16::<LittleEndian>(settings.tag() as u16)?;
            writer.write_u16::<LittleEndian>(0)?;
            write_node_settings(writer, settings)?;
        }
        self.dataset.write(writer)?;
        writer.write_u32::<LittleEndian>(self.root)
    }
}

fn read_optional_index<R: Read>(reader: &mut R) -> Result<Option<NodeIndex>, GraphError> {
    let raw = reader.read_u32::<LittleEndian>()?;
    Ok(if raw == INVALID_INDEX { None } else { Some(raw) })
}

fn write_optional_index<W: Write>(
    writer: &mut W,
    index: Option<NodeIndex>,
) -> std::io::Result<()> {
    writer.write_u32::<LittleEndian>(index.unwrap_or(INVALID_INDEX))
}

fn read_node_settings<R: Read>(reader: &mut R, tag: NodeTag) -> Result<NodeSettings, GraphError> {
    Ok(match tag {
        NodeTag::AnimationClip => NodeSettings::AnimationClip(AnimationClipSettings {
            data_slot: reader.read_u32::<LittleEndian>()?,
            play_in_reverse: read_optional_index(reader)?,
        }),
        NodeTag::Blend => {
            let source = reader.read_u32::<LittleEndian>()?;
            let target = reader.read_u32::<LittleEndian>()?;
            let weight = reader.read_u32::<LittleEndian>()?;
            let bits = reader.read_u32::<LittleEndian>()?;
            let options = BlendOptions::from_bits(bits).ok_or_else(|| {
                GraphError::InvalidDefinition(format!("unknown blend option bits {bits:#x}"))
            })?;
            let mask_len = reader.read_u32::<LittleEndian>()?;
            let bone_mask = if mask_len == 0 {
                None
            } else {
                let mut weights = Vec::with_capacity(mask_len as usize);
                for _ in 0..mask_len {
                    weights.push(reader.read_f32::<LittleEndian>()?);
                }
                Some(BoneMask::new(weights))
            };
            NodeSettings::Blend(BlendSettings {
                source,
                target,
                weight,
                options,
                bone_mask,
            })
        }
        NodeTag::Passthrough => NodeSettings::Passthrough(PassthroughSettings {
            child: reader.read_u32::<LittleEndian>()?,
        }),
        NodeTag::State => NodeSettings::State(StateSettings {
            child: reader.read_u32::<LittleEndian>()?,
            entry_event: StringId(reader.read_u64::<LittleEndian>()?),
            exit_event: StringId(reader.read_u64::<LittleEndian>()?),
        }),
        NodeTag::Transition => NodeSettings::Transition(TransitionSettings {
            target_state: reader.read_u32::<LittleEndian>()?,
            duration: reader.read_f32::<LittleEndian>()?,
        }),
        NodeTag::StateMachine => {
            let state_count = reader.read_u32::<LittleEndian>()?;
            let mut states = Vec::with_capacity(state_count as usize);
            for _ in 0..state_count {
                let state_node = reader.read_u32::<LittleEndian>()?;
                let transition_count = reader.read_u32::<LittleEndian>()?;
                let mut transitions = Vec::with_capacity(transition_count as usize);
                for _ in 0..transition_count {
                    let transition_node = reader.read_u32::<LittleEndian>()?;
                    let condition = reader.read_u32::<LittleEndian>()?;
                    let target_state_index = reader.read_u16::<LittleEndian>()?;
                    let _reserved = reader.read_u16::<LittleEndian>()?;
                    transitions.push(TransitionRef {
                        transition_node,
                        condition,
                        target_state_index,
                    });
                }
                states.push(StateRef {
                    state_node,
                    transitions,
                });
            }
            NodeSettings::StateMachine(StateMachineSettings { states })
        }
        NodeTag::SpeedScale => NodeSettings::SpeedScale(SpeedScaleSettings {
            child: reader.read_u32::<LittleEndian>()?,
            scale: read_optional_index(reader)?,
            blend_time: reader.read_f32::<LittleEndian>()?,
        }),
        NodeTag::RootMotionOverride => {
            let child = reader.read_u32::<LittleEndian>()?;
            let heading_velocity = read_optional_index(reader)?;
            let facing_direction = read_optional_index(reader)?;
            let velocity_limit = read_optional_index(reader)?;
            let bits = reader.read_u32::<LittleEndian>()?;
            let flags = RootMotionOverrideFlags::from_bits(bits).ok_or_else(|| {
                GraphError::InvalidDefinition(format!("unknown override flag bits {bits:#x}"))
            })?;
            NodeSettings::RootMotionOverride(RootMotionOverrideSettings {
                child,
                heading_velocity,
                facing_direction,
                velocity_limit,
                flags,
                max_linear_velocity: reader.read_f32::<LittleEndian>()?,
            })
        }
        NodeTag::BoolParameter => NodeSettings::BoolParameter(BoolParameterSettings {
            name: StringId(reader.read_u64::<LittleEndian>()?),
            default_value: reader.read_u8()? != 0,
        }),
        NodeTag::FloatParameter => NodeSettings::FloatParameter(FloatParameterSettings {
            name: StringId(reader.read_u64::<LittleEndian>()?),
            default_value: reader.read_f32::<LittleEndian>()?,
        }),
        NodeTag::IdParameter => NodeSettings::IdParameter(IdParameterSettings {
            name: StringId(reader.read_u64::<LittleEndian>()?),
            default_value: StringId(reader.read_u64::<LittleEndian>()?),
        }),
        NodeTag::VectorParameter => {
            let name = StringId(reader.read_u64::<LittleEndian>()?);
            let mut default_value = [0.0f32; 3];
            for component in &mut default_value {
                *component = reader.read_f32::<LittleEndian>()?;
            }
            NodeSettings::VectorParameter(VectorParameterSettings {
                name,
                default_value,
            })
        }
        NodeTag::BoolAnd => NodeSettings::BoolAnd(BoolAndSettings {
            input_a: reader.read_u32::<LittleEndian>()?,
            input_b: reader.read_u32::<LittleEndian>()?,
        }),
        NodeTag::BoolOr => NodeSettings::BoolOr(BoolOrSettings {
            input_a: reader.read_u32::<LittleEndian>()?,
            input_b: reader.read_u32::<LittleEndian>()?,
        }),
        NodeTag::BoolNot => NodeSettings::BoolNot(BoolNotSettings {
            input: reader.read_u32::<LittleEndian>()?,
        }),
        NodeTag::FloatClamp => NodeSettings::FloatClamp(FloatClampSettings {
            input: reader.read_u32::<LittleEndian>()?,
            min: reader.read_f32::<LittleEndian>()?,
            max: reader.read_f32::<LittleEndian>()?,
        }),
        NodeTag::IdComparison => NodeSettings::IdComparison(IdComparisonSettings {
            input: reader.read_u32::<LittleEndian>()?,
            compare_to: StringId(reader.read_u64::<LittleEndian>()?),
        }),
        NodeTag::EventCondition => NodeSettings::EventCondition(EventConditionSettings {
            event: StringId(reader.read_u64::<LittleEndian>()?),
        }),
    })
}

fn write_node_settings<W: Write>(writer: &mut W, settings: &NodeSettings) -> std::io::Result<()> {
    match settings {
        NodeSettings::AnimationClip(s) => {
            writer.write_u32::<LittleEndian>(s.data_slot)?;
            write_optional_index(writer, s.play_in_reverse)?;
        }
        NodeSettings::Blend(s) => {
            writer.write_u32::<LittleEndian>(s.source)?;
            writer.write_u32::<LittleEndian>(s.target)?;
            writer.write_u32::<LittleEndian>(s.weight)?;
            writer.write_u32::<LittleEndian>(s.options.bits())?;
            match &s.bone_mask {
                None => writer.write_u32::<LittleEndian>(0)?,
                Some(mask) => {
                    writer.write_u32::<LittleEndian>(mask.weight_count() as u32)?;
                    for weight in mask.weights() {
                        writer.write_f32::<LittleEndian>(*weight)?;
                    }
                }
            }
        }
        NodeSettings::Passthrough(s) => {
            writer.write_u32::<LittleEndian>(s.child)?;
        }
        NodeSettings::State(s) => {
            writer.write_u32::<LittleEndian>(s.child)?;
            writer.write_u64::<LittleEndian>(s.entry_event.0)?;
            writer.write_u64::<LittleEndian>(s.exit_event.0)?;
        }
        NodeSettings::Transition(s) => {
            writer.write_u32::<LittleEndian>(s.target_state)?;
            writer.write_f32::<LittleEndian>(s.duration)?;
        }
        NodeSettings::StateMachine(s) => {
            writer.write_u32::<LittleEndian>(s.states.len() as u32)?;
            for state in &s.states {
                writer.write_u32::<LittleEndian>(state.state_node)?;
                writer.write_u32::<LittleEndian>(state.transitions.len() as u32)?;
                for transition in &state.transitions {
                    writer.write_u32::<LittleEndian>(transition.transition_node)?;
                    writer.write_u32::<LittleEndian>(transition.condition)?;
                    writer.write_u16::<LittleEndian>(transition.target_state_index)?;
                    writer.write_u16::<LittleEndian>(0)?;
                }
            }
        }
        NodeSettings::SpeedScale(s) => {
            writer.write_u32::<LittleEndian>(s.child)?;
            write_optional_index(writer, s.scale)?;
            writer.write_f32::<LittleEndian>(s.blend_time)?;
        }
        NodeSettings::RootMotionOverride(s) => {
            writer.write_u32::<LittleEndian>(s.child)?;
            write_optional_index(writer, s.heading_velocity)?;
            write_optional_index(writer, s.facing_direction)?;
            write_optional_index(writer, s.velocity_limit)?;
            writer.write_u32::<LittleEndian>(s.flags.bits())?;
            writer.write_f32::<LittleEndian>(s.max_linear_velocity)?;
        }
        NodeSettings::BoolParameter(s) => {
            writer.write_u64::<LittleEndian>(s.name.0)?;
            writer.write_u8(s.default_value as u8)?;
        }
        NodeSettings::FloatParameter(s) => {
            writer.write_u64::<LittleEndian>(s.name.0)?;
            writer.write_f32::<LittleEndian>(s.default_value)?;
        }
        NodeSettings::IdParameter(s) => {
            writer.write_u64::<LittleEndian>(s.name.0)?;
            writer.write_u64::<LittleEndian>(s.default_value.0)?;
        }
        NodeSettings::VectorParameter(s) => {
            writer.write_u64::<LittleEndian>(s.name.0)?;
            for component in s.default_value {
                writer.write_f32::<LittleEndian>(component)?;
            }
        }
        NodeSettings::BoolAnd(s) => {
            writer.write_u32::<LittleEndian>(s.input_a)?;
            writer.write_u32::<LittleEndian>(s.input_b)?;
        }
        NodeSettings::BoolOr(s) => {
            writer.write_u32::<LittleEndian>(s.input_a)?;
            writer.write_u32::<LittleEndian>(s.input_b)?;
        }
        NodeSettings::BoolNot(s) => {
            writer.write_u32::<LittleEndian>(s.input)?;
        }
        NodeSettings::FloatClamp(s) => {
            writer.write_u32::<LittleEndian>(s.input)?;
            writer.write_f32::<LittleEndian>(s.min)?;
            writer.write_f32::<LittleEndian>(s.max)?;
        }
        NodeSettings::IdComparison(s) => {
            writer.write_u32::<LittleEndian>(s.input)?;
            writer.write_u64::<LittleEndian>(s.compare_to.0)?;
        }
        NodeSettings::EventCondition(s) => {
            writer.write_u64::<LittleEndian>(s.event.0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn representative_definition() -> GraphDefinition {
        // 0: clip, 1: clip, 2: float parameter, 3: blend of 0 and 1.
        GraphDefinition::new(
            vec![
                NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 0,
                    play_in_reverse: None,
                }),
                NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 1,
                    play_in_reverse: None,
                }),
                NodeSettings::FloatParameter(FloatParameterSettings {
                    name: StringId::from_name("Weight"),
                    default_value: 0.5,
                }),
                NodeSettings::Blend(BlendSettings {
                    source: 0,
                    target: 1,
                    weight: 2,
                    options: BlendOptions::INTERPOLATIVE,
                    bone_mask: Some(BoneMask::new(vec![1.0, 0.5])),
                }),
            ],
            DatasetDescriptor {
                asset_id: 9,
                clip_ids: vec![100, 101],
            },
            3,
        )
        .unwrap()
    }

    #[test]
    fn definition_round_trips_through_bytes() {
        let definition = representative_definition();
        let mut bytes = Vec::new();
        definition.write(&mut bytes).unwrap();

        let read = GraphDefinition::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(read.node_count(), definition.node_count());
        assert_eq!(read.root(), definition.root());
        assert_eq!(read.nodes(), definition.nodes());
        assert_eq!(read.dataset_descriptor(), definition.dataset_descriptor());
    }

    #[test]
    fn unknown_tags_and_truncation_are_rejected() {
        let definition = representative_definition();
        let mut bytes = Vec::new();
        definition.write(&mut bytes).unwrap();

        // Corrupt the first node's tag (right after magic + version + count).
        bytes[12] = 0xFF;
        bytes[13] = 0xFF;
        assert!(matches!(
            GraphDefinition::read(&mut bytes.as_slice()),
            Err(GraphError::InvalidDefinition(_))
        ));

        let mut bytes = Vec::new();
        definition.write(&mut bytes).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(GraphDefinition::read(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn out_of_bounds_references_fail_validation() {
        let result = GraphDefinition::new(
            vec![NodeSettings::Passthrough(PassthroughSettings { child: 7 })],
            DatasetDescriptor::default(),
            0,
        );
        assert!(matches!(
            result,
            Err(GraphError::NodeIndexOutOfBounds { node: 7, .. })
        ));
    }

    #[test]
    fn value_node_root_is_rejected() {
        let result = GraphDefinition::new(
            vec![NodeSettings::BoolParameter(BoolParameterSettings {
                name: StringId::from_name("x"),
                default_value: false,
            })],
            DatasetDescriptor::default(),
            0,
        );
        assert!(matches!(result, Err(GraphError::InvalidDefinition(_))));
    }

    #[test]
    fn additive_blends_are_rejected_at_load() {
        let result = GraphDefinition::new(
            vec![
                NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 0,
                    play_in_reverse: None,
                }),
                NodeSettings::FloatParameter(FloatParameterSettings {
                    name: StringId::from_name("w"),
                    default_value: 0.0,
                }),
                NodeSettings::Blend(BlendSettings {
                    source: 0,
                    target: 0,
                    weight: 1,
                    options: BlendOptions::ADDITIVE,
                    bone_mask: None,
                }),
            ],
            DatasetDescriptor::default(),
            2,
        );
        assert!(matches!(result, Err(GraphError::InvalidDefinition(_))));
    }
}
