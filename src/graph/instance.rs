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

//! The per-character graph instance and its evaluation driver.

use crate::{
    dataset::AnimationGraphDataset,
    error::GraphError,
    event::{SampledEvent, SampledEventsBuffer},
    graph::{
        context::GraphContext,
        definition::{GraphDefinition, NodeSettings},
        node::{
            self, AnimationClipNode, BlendNode, BoolAndNode, BoolNotNode, BoolOrNode,
            BoolParameterNode, EventConditionNode, FloatClampNode, FloatParameterNode,
            GraphNode, GraphValue, IdComparisonNode, IdParameterNode, NodeArena,
            PassthroughNode, RootMotionOverrideNode, SpeedScaleNode, StateMachineNode,
            StateNode, TransitionNode, VectorParameterNode,
        },
    },
    math::Transform,
    pose::{InitialPoseState, Pose},
    skeleton::Skeleton,
    sync_track::SyncTrackTime,
    task::TaskSystem,
    NodeIndex, Seconds, StringId,
};
use fxhash::FxHashMap;
use nalgebra::Vector3;
use std::sync::Arc;

/// What one evaluation produced, borrowed from the instance until the next
/// call mutates it.
pub struct EvaluationResult<'a> {
    /// The final skinned pose in character-local space.
    pub pose: &'a Pose,
    /// The frame's root-motion delta.
    pub root_motion_delta: Transform,
    /// Every event sampled this frame, in traversal order.
    pub events: &'a [SampledEvent],
}

/// The mutable per-character side of an animation graph: runtime nodes, the
/// control parameter table, a task system with its pose buffer pool, and the
/// sampled events buffer.
///
/// Instances of the same graph share one immutable [`GraphDefinition`] (and
/// dataset); everything mutable lives here, so instances can be evaluated on
/// different threads concurrently.
pub struct GraphInstance {
    definition: Arc<GraphDefinition>,
    dataset: Arc<AnimationGraphDataset>,
    nodes: NodeArena,
    parameters: FxHashMap<StringId, NodeIndex>,
    tasks: TaskSystem,
    events: SampledEventsBuffer,
    skeleton: Option<Arc<Skeleton>>,
    final_pose: Option<Pose>,
    root_motion: Transform,
    update_id: u64,
}

impl GraphInstance {
    /// Instantiates the runtime side of a definition against a dataset. The
    /// dataset is validated against the descriptor compiled into the
    /// definition, every node is constructed in settings order, and the
    /// parameter name table is built.
    pub fn new(
        definition: Arc<GraphDefinition>,
        dataset: Arc<AnimationGraphDataset>,
    ) -> Result<Self, GraphError> {
        dataset.validate(definition.dataset_descriptor())?;

        let mut slots = Vec::with_capacity(definition.node_count());
        let mut parameters = FxHashMap::default();
        for (index, settings) in definition.nodes().iter().enumerate() {
            let index = index as NodeIndex;
            if let Some(name) = parameter_name(settings) {
                if parameters.insert(name, index).is_some() {
                    return Err(GraphError::InvalidDefinition(format!(
                        "duplicate control parameter name at node {index}"
                    )));
                }
            }
            slots.push(instantiate_node(index, settings, &dataset)?);
        }

        Ok(Self {
            definition,
            dataset,
            nodes: NodeArena::new(slots),
            parameters,
            tasks: TaskSystem::default(),
            events: SampledEventsBuffer::default(),
            skeleton: None,
            final_pose: None,
            root_motion: Transform::identity(),
            update_id: 0,
        })
    }

    /// The shared definition this instance runs.
    #[inline]
    pub fn definition(&self) -> &Arc<GraphDefinition> {
        &self.definition
    }

    /// The dataset backing the instance's data slots.
    #[inline]
    pub fn dataset(&self) -> &Arc<AnimationGraphDataset> {
        &self.dataset
    }

    /// Binds the instance to a skeleton and initializes the node graph at a
    /// starting sync time.
    pub fn initialize(
        &mut self,
        skeleton: Arc<Skeleton>,
        start_sync_time: SyncTrackTime,
    ) -> Result<(), GraphError> {
        self.tasks.initialize(skeleton.clone());
        self.final_pose = Some(Pose::new(skeleton.clone(), InitialPoseState::Reference));
        node::reset_value_caches(&mut self.nodes);

        let definition = self.definition.clone();
        let mut ctx = GraphContext::new(
            &skeleton,
            None,
            0.0,
            Transform::identity(),
            self.update_id,
            &mut self.tasks,
            &mut self.events,
        );
        node::initialize(
            definition.root(),
            &mut self.nodes,
            &definition,
            &mut ctx,
            start_sync_time,
        )?;

        self.skeleton = Some(skeleton);
        Ok(())
    }

    /// Shuts the node graph down. The last produced pose stays readable; the
    /// instance can be re-initialized afterwards.
    pub fn shutdown(&mut self) -> Result<(), GraphError> {
        let definition = self.definition.clone();
        node::shutdown(definition.root(), &mut self.nodes, &definition)?;
        self.skeleton = None;
        Ok(())
    }

    /// Resolves a control parameter name to its node index. Unknown names are
    /// logged and yield `None`.
    pub fn get_parameter_index(&self, name: &str) -> Option<NodeIndex> {
        let index = self.parameters.get(&StringId::from_name(name)).copied();
        if index.is_none() {
            log::warn!("unknown control parameter {name:?}");
        }
        index
    }

    /// Writes a control parameter by index; visible to the next evaluation.
    pub fn set_parameter(
        &mut self,
        index: NodeIndex,
        value: GraphValue,
    ) -> Result<(), GraphError> {
        node::set_value(index, &mut self.nodes, value)
    }

    /// Writes a bool control parameter.
    pub fn set_bool_parameter(
        &mut self,
        index: NodeIndex,
        value: bool,
    ) -> Result<(), GraphError> {
        self.set_parameter(index, GraphValue::Bool(value))
    }

    /// Writes a float control parameter.
    pub fn set_float_parameter(
        &mut self,
        index: NodeIndex,
        value: f32,
    ) -> Result<(), GraphError> {
        self.set_parameter(index, GraphValue::Float(value))
    }

    /// Writes an ID control parameter.
    pub fn set_id_parameter(
        &mut self,
        index: NodeIndex,
        value: StringId,
    ) -> Result<(), GraphError> {
        self.set_parameter(index, GraphValue::Id(value))
    }

    /// Writes a vector control parameter.
    pub fn set_vector_parameter(
        &mut self,
        index: NodeIndex,
        value: Vector3<f32>,
    ) -> Result<(), GraphError> {
        self.set_parameter(index, GraphValue::Vector(value))
    }

    /// Runs one frame: walks the node graph (which registers pose tasks),
    /// executes the task DAG, and returns the final pose, root-motion delta
    /// and sampled events.
    ///
    /// On a fatal error the frame's partially registered tasks are discarded,
    /// the previous pose stays current and the error is returned.
    pub fn evaluate(
        &mut self,
        delta_time: Seconds,
        world_transform: Transform,
    ) -> Result<EvaluationResult<'_>, GraphError> {
        let skeleton = self.skeleton.clone().ok_or(GraphError::NotInitialized)?;
        if self.final_pose.is_none() {
            return Err(GraphError::NotInitialized);
        }

        self.update_id += 1;
        self.tasks.reset();
        self.events.clear();

        let definition = self.definition.clone();
        let walk_result = {
            let mut ctx = GraphContext::new(
                &skeleton,
                self.final_pose.as_ref(),
                delta_time,
                world_transform,
                self.update_id,
                &mut self.tasks,
                &mut self.events,
            );
            node::update(definition.root(), &mut self.nodes, &definition, &mut ctx)
        };
        let walk_result = match walk_result {
            Ok(result) => result,
            Err(error) => {
                self.tasks.reset();
                return Err(error);
            }
        };

        self.root_motion = walk_result.root_motion_delta;

        if let Some(final_task) = walk_result.task {
            let output = match self.tasks.execute(final_task) {
                Ok(buffer) => buffer,
                Err(error) => {
                    self.tasks.reset();
                    return Err(error);
                }
            };
            if let Some(final_pose) = self.final_pose.as_mut() {
                final_pose.clone_from(self.tasks.buffer_pose(output));
            }
        }

        let pose = self
            .final_pose
            .as_ref()
            .ok_or(GraphError::NotInitialized)?;
        Ok(EvaluationResult {
            pose,
            root_motion_delta: self.root_motion,
            events: self.events.events(),
        })
    }

    /// The most recent output pose.
    pub fn pose(&self) -> Option<&Pose> {
        self.final_pose.as_ref()
    }

    /// The most recent root-motion delta.
    #[inline]
    pub fn root_motion(&self) -> &Transform {
        &self.root_motion
    }

    /// The task system, for inspection.
    #[inline]
    pub fn task_system(&self) -> &TaskSystem {
        &self.tasks
    }

    /// Number of evaluations run so far.
    #[inline]
    pub fn update_id(&self) -> u64 {
        self.update_id
    }
}

fn parameter_name(settings: &NodeSettings) -> Option<StringId> {
    match settings {
        NodeSettings::BoolParameter(s) => Some(s.name),
        NodeSettings::FloatParameter(s) => Some(s.name),
        NodeSettings::IdParameter(s) => Some(s.name),
        NodeSettings::VectorParameter(s) => Some(s.name),
        _ => None,
    }
}

pub(crate) fn instantiate_node(
    index: NodeIndex,
    settings: &NodeSettings,
    dataset: &AnimationGraphDataset,
) -> Result<GraphNode, GraphError> {
    Ok(match settings {
        NodeSettings::AnimationClip(s) => {
            let clip = dataset.clip(s.data_slot).cloned().ok_or_else(|| {
                GraphError::DatasetMismatch(format!(
                    "node {index}: data slot {} is out of range",
                    s.data_slot
                ))
            })?;
            GraphNode::AnimationClip(AnimationClipNode::new(index, clip))
        }
        NodeSettings::Blend(_) => GraphNode::Blend(BlendNode::new(index)),
        NodeSettings::Passthrough(_) => GraphNode::Passthrough(PassthroughNode::new(index)),
        NodeSettings::State(_) => GraphNode::State(StateNode::new(index)),
        NodeSettings::Transition(_) => GraphNode::Transition(TransitionNode::new(index)),
        NodeSettings::StateMachine(_) => GraphNode::StateMachine(StateMachineNode::new(index)),
        NodeSettings::SpeedScale(_) => GraphNode::SpeedScale(SpeedScaleNode::new(index)),
        NodeSettings::RootMotionOverride(_) => {
            GraphNode::RootMotionOverride(RootMotionOverrideNode::new(index))
        }
        NodeSettings::BoolParameter(s) => {
            GraphNode::BoolParameter(BoolParameterNode::new(index, s.default_value))
        }
        NodeSettings::FloatParameter(s) => {
            GraphNode::FloatParameter(FloatParameterNode::new(index, s.default_value))
        }
        NodeSettings::IdParameter(s) => {
            GraphNode::IdParameter(IdParameterNode::new(index, s.default_value))
        }
        NodeSettings::VectorParameter(s) => GraphNode::VectorParameter(VectorParameterNode::new(
            index,
            Vector3::new(s.default_value[0], s.default_value[1], s.default_value[2]),
        )),
        NodeSettings::BoolAnd(_) => GraphNode::BoolAnd(BoolAndNode::new(index)),
        NodeSettings::BoolOr(_) => GraphNode::BoolOr(BoolOrNode::new(index)),
        NodeSettings::BoolNot(_) => GraphNode::BoolNot(BoolNotNode::new(index)),
        NodeSettings::FloatClamp(_) => GraphNode::FloatClamp(FloatClampNode::new(index)),
        NodeSettings::IdComparison(_) => GraphNode::IdComparison(IdComparisonNode::new(index)),
        NodeSettings::EventCondition(_) => {
            GraphNode::EventCondition(EventConditionNode::new(index))
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        clip::AnimationClip,
        dataset::DatasetDescriptor,
        event::{AnimationEvent, SampledEventSource},
        graph::definition::{
            AnimationClipSettings, BlendOptions, BlendSettings, BoolParameterSettings,
            EventConditionSettings, FloatParameterSettings, PassthroughSettings,
            RootMotionOverrideFlags, RootMotionOverrideSettings, SpeedScaleSettings, StateRef,
            StateMachineSettings, StateSettings, TransitionRef, TransitionSettings,
            VectorParameterSettings,
        },
        graph::node::PoseNodeOps,
        sync_track::SyncTrack,
        task::Task,
        track::{BoneTrack, TrackKey},
    };

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![("root".to_string(), None), ("spine".to_string(), Some(0))],
                vec![Transform::identity(); 2],
            )
            .unwrap(),
        )
    }

    fn translation_key(time: f32, x: f32) -> TrackKey {
        TrackKey {
            time,
            transform: Transform::from_translation(Vector3::new(x, 0.0, 0.0)),
        }
    }

    /// Bone 1 moves linearly from x = 0 at t = 0 to x = duration at the end.
    fn linear_clip(asset_id: u64, skeleton: &Arc<Skeleton>, duration: f32) -> AnimationClip {
        AnimationClip::new(
            asset_id,
            skeleton.clone(),
            vec![BoneTrack::new(
                1,
                vec![translation_key(0.0, 0.0), translation_key(duration, duration)],
            )],
            30,
        )
    }

    fn constant_clip(asset_id: u64, skeleton: &Arc<Skeleton>, duration: f32, x: f32) -> AnimationClip {
        AnimationClip::new(
            asset_id,
            skeleton.clone(),
            vec![BoneTrack::new(
                1,
                vec![translation_key(0.0, x), translation_key(duration, x)],
            )],
            30,
        )
    }

    fn build_instance(clips: Vec<AnimationClip>, nodes: Vec<NodeSettings>, root: NodeIndex) -> GraphInstance {
        let clips: Vec<Arc<AnimationClip>> = clips.into_iter().map(Arc::new).collect();
        let dataset = Arc::new(AnimationGraphDataset::new(1000, clips));
        let definition = Arc::new(
            GraphDefinition::new(nodes, dataset.descriptor(), root).unwrap(),
        );
        let mut instance = GraphInstance::new(definition, dataset).unwrap();
        instance
            .initialize(skeleton(), SyncTrackTime::default())
            .unwrap();
        instance
    }

    fn clip_node_state(instance: &GraphInstance, index: NodeIndex) -> &crate::graph::node::PoseNodeState {
        match instance.nodes.get(index).unwrap() {
            GraphNode::AnimationClip(n) => n.state(),
            other => panic!("node {index} is not a clip node: {other:?}"),
        }
    }

    fn count_state_events(events: &[SampledEvent], id: StringId) -> usize {
        events
            .iter()
            .filter(|e| e.is_state_event() && e.id == id)
            .count()
    }

    #[test]
    fn single_clip_advances_without_looping() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![linear_clip(1, &skeleton, 2.0)],
            vec![NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 0,
                play_in_reverse: None,
            })],
            0,
        );

        for _ in 0..4 {
            let result = instance.evaluate(0.25, Transform::identity()).unwrap();
            assert!((result.root_motion_delta.translation.norm()) < 1e-6);
            assert_eq!(instance.task_system().task_count(), 1);
        }

        let state = clip_node_state(&instance, 0);
        assert!((state.current_time - 0.5).abs() < 1e-5);
        assert_eq!(state.loop_count, 0);
        // The output pose equals the clip sampled at 0.5 * 2.0 seconds.
        let pose = instance.pose().unwrap();
        assert!((pose.transform(1).translation.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn clip_wraps_and_counts_loops() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![linear_clip(1, &skeleton, 1.0)],
            vec![NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 0,
                play_in_reverse: None,
            })],
            0,
        );

        for _ in 0..3 {
            instance.evaluate(0.4, Transform::identity()).unwrap();
        }
        let state = clip_node_state(&instance, 0);
        assert!((state.current_time - 0.2).abs() < 1e-5);
        assert_eq!(state.loop_count, 1);
    }

    #[test]
    fn pose_time_follows_accumulated_dt_over_many_updates() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![linear_clip(1, &skeleton, 1.6)],
            vec![NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 0,
                play_in_reverse: None,
            })],
            0,
        );

        let dt = 0.07;
        let updates = 40;
        for _ in 0..updates {
            instance.evaluate(dt, Transform::identity()).unwrap();
        }
        let expected = (updates as f32 * dt / 1.6).fract();
        let expected_loops = (updates as f32 * dt / 1.6).floor() as u32;
        let state = clip_node_state(&instance, 0);
        assert!(
            (state.current_time - expected).abs() < 1e-4,
            "expected {expected}, got {}",
            state.current_time
        );
        assert_eq!(state.loop_count, expected_loops);
    }

    fn synchronized_blend_instance() -> GraphInstance {
        let skeleton = skeleton();
        let mut long_clip = linear_clip(1, &skeleton, 2.0);
        long_clip.set_sync_track(SyncTrack::with_equal_events(4));
        long_clip.set_events(vec![AnimationEvent::immediate(
            StringId::from_name("StepA"),
            0.5,
        )]);
        let mut short_clip = linear_clip(2, &skeleton, 1.0);
        short_clip.set_sync_track(SyncTrack::with_equal_events(4));

        build_instance(
            vec![long_clip, short_clip],
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
                    bone_mask: None,
                }),
            ],
            3,
        )
    }

    #[test]
    fn synchronized_blend_of_unequal_durations() {
        let mut instance = synchronized_blend_instance();

        // Blended duration is Lerp(2.0, 1.0, 0.5) right after initialization.
        let blend_state = match instance.nodes.get(3).unwrap() {
            GraphNode::Blend(n) => n.state().clone(),
            _ => unreachable!(),
        };
        assert!((blend_state.duration - 1.5).abs() < 1e-5);

        let result = instance.evaluate(0.75, Transform::identity()).unwrap();
        // The long clip's event fired at one quarter of its timeline, scaled
        // down by the blend's own influence.
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].id, StringId::from_name("StepA"));
        assert_eq!(result.events[0].source, SampledEventSource::AnimationClip(1));
        assert!((result.events[0].weight - 0.5).abs() < 1e-5);

        let blend_state = match instance.nodes.get(3).unwrap() {
            GraphNode::Blend(n) => n.state().clone(),
            _ => unreachable!(),
        };
        assert!((blend_state.current_time - 0.5).abs() < 1e-5);
        assert!((blend_state.duration - 1.5).abs() < 1e-5);

        // Both children were driven over the same sync window and sit at the
        // same phase despite their different absolute durations.
        assert!((clip_node_state(&instance, 0).current_time - 0.5).abs() < 1e-5);
        assert!((clip_node_state(&instance, 1).current_time - 0.5).abs() < 1e-5);
    }

    #[test]
    fn blend_weight_endpoints_reproduce_the_inputs() {
        let skeleton = skeleton();
        let build = |weight: f32| {
            build_instance(
                vec![
                    constant_clip(1, &skeleton, 1.0, 1.0),
                    constant_clip(2, &skeleton, 1.0, 3.0),
                ],
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
                        default_value: weight,
                    }),
                    NodeSettings::Blend(BlendSettings {
                        source: 0,
                        target: 1,
                        weight: 2,
                        options: BlendOptions::INTERPOLATIVE,
                        bone_mask: None,
                    }),
                ],
                3,
            )
        };

        let mut at_zero = build(0.0);
        let result = at_zero.evaluate(0.1, Transform::identity()).unwrap();
        assert!((result.pose.transform(1).translation.x - 1.0).abs() < 1e-6);

        let mut at_one = build(1.0);
        let result = at_one.evaluate(0.1, Transform::identity()).unwrap();
        assert!((result.pose.transform(1).translation.x - 3.0).abs() < 1e-6);
    }

    #[test]
    fn exactly_one_pose_buffer_remains_owned_after_evaluation() {
        let mut instance = synchronized_blend_instance();
        for _ in 0..3 {
            instance.evaluate(0.1, Transform::identity()).unwrap();
            assert_eq!(instance.task_system().pose_buffer_pool().owned_count(), 1);
        }
    }

    fn state_machine_nodes(transition_duration: f32) -> Vec<NodeSettings> {
        vec![
            // 0, 1: the clips backing the two states.
            NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 0,
                play_in_reverse: None,
            }),
            NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 1,
                play_in_reverse: None,
            }),
            // 2, 3: the states.
            NodeSettings::State(StateSettings {
                child: 0,
                entry_event: StringId::NONE,
                exit_event: StringId::NONE,
            }),
            NodeSettings::State(StateSettings {
                child: 1,
                entry_event: StringId::NONE,
                exit_event: StringId::NONE,
            }),
            // 4: the trigger, 5: the transition, 6: the machine.
            NodeSettings::BoolParameter(BoolParameterSettings {
                name: StringId::from_name("Jump"),
                default_value: false,
            }),
            NodeSettings::Transition(TransitionSettings {
                target_state: 3,
                duration: transition_duration,
            }),
            NodeSettings::StateMachine(StateMachineSettings {
                states: vec![
                    StateRef {
                        state_node: 2,
                        transitions: vec![TransitionRef {
                            transition_node: 5,
                            condition: 4,
                            target_state_index: 1,
                        }],
                    },
                    StateRef {
                        state_node: 3,
                        transitions: Vec::new(),
                    },
                ],
            }),
        ]
    }

    #[test]
    fn state_machine_runs_a_full_transition() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![
                constant_clip(1, &skeleton, 1.0, 1.0),
                constant_clip(2, &skeleton, 1.0, 3.0),
            ],
            state_machine_nodes(0.2),
            6,
        );
        let jump = instance.get_parameter_index("Jump").unwrap();

        // Frame 0: the trigger is down, the entry state rules.
        let result = instance.evaluate(0.1, Transform::identity()).unwrap();
        assert!((result.pose.transform(1).translation.x - 1.0).abs() < 1e-6);
        {
            let GraphNode::StateMachine(machine) = instance.nodes.get(6).unwrap() else {
                unreachable!()
            };
            assert!(!machine.is_transition_active());
            assert_eq!(machine.active_state_index(), 0);
        }

        // Frame 1: trigger fires; the cross-fade starts this very frame and
        // the output is a half-way blend of both states.
        instance.set_bool_parameter(jump, true).unwrap();
        let result = instance.evaluate(0.1, Transform::identity()).unwrap();
        assert!((result.pose.transform(1).translation.x - 2.0).abs() < 1e-5);
        {
            let GraphNode::StateMachine(machine) = instance.nodes.get(6).unwrap() else {
                unreachable!()
            };
            assert!(machine.is_transition_active());
            let GraphNode::Transition(transition) = instance.nodes.get(5).unwrap() else {
                unreachable!()
            };
            assert!((transition.progress() - 0.5).abs() < 1e-6);
        }
        match instance.task_system().tasks().last().unwrap() {
            Task::Blend(blend) => assert!((blend.blend_weight() - 0.5).abs() < 1e-6),
            other => panic!("expected a blend task, got {other:?}"),
        }

        // Frame 2: the fade completes and is retired within the same update.
        let result = instance.evaluate(0.1, Transform::identity()).unwrap();
        assert!((result.pose.transform(1).translation.x - 3.0).abs() < 1e-5);
        {
            let GraphNode::StateMachine(machine) = instance.nodes.get(6).unwrap() else {
                unreachable!()
            };
            assert!(!machine.is_transition_active());
            assert_eq!(machine.active_state_index(), 1);
        }

        // Frame 3: the target state carries on alone.
        let result = instance.evaluate(0.1, Transform::identity()).unwrap();
        assert!((result.pose.transform(1).translation.x - 3.0).abs() < 1e-6);
        assert_eq!(instance.task_system().task_count(), 1);
    }

    #[test]
    fn transition_preserves_the_source_phase() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![
                linear_clip(1, &skeleton, 1.0),
                linear_clip(2, &skeleton, 1.0),
            ],
            state_machine_nodes(0.2),
            6,
        );
        let jump = instance.get_parameter_index("Jump").unwrap();

        for _ in 0..3 {
            instance.evaluate(0.1, Transform::identity()).unwrap();
        }
        instance.set_bool_parameter(jump, true).unwrap();
        instance.evaluate(0.1, Transform::identity()).unwrap();

        // The source sat at 0.4 when the fade began; the target picked that
        // phase up instead of starting from zero.
        assert!((clip_node_state(&instance, 1).current_time - 0.4).abs() < 1e-5);
    }

    #[test]
    fn state_entry_and_exit_events_fire_once_per_activation() {
        let skeleton = skeleton();
        let enter_walk = StringId::from_name("EnterWalk");
        let exit_walk = StringId::from_name("ExitWalk");
        let enter_jump = StringId::from_name("EnterJump");
        let exit_jump = StringId::from_name("ExitJump");
        let nodes = vec![
            NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 0,
                play_in_reverse: None,
            }),
            NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 1,
                play_in_reverse: None,
            }),
            NodeSettings::State(StateSettings {
                child: 0,
                entry_event: enter_walk,
                exit_event: exit_walk,
            }),
            NodeSettings::State(StateSettings {
                child: 1,
                entry_event: enter_jump,
                exit_event: exit_jump,
            }),
            NodeSettings::BoolParameter(BoolParameterSettings {
                name: StringId::from_name("Jump"),
                default_value: false,
            }),
            NodeSettings::Transition(TransitionSettings {
                target_state: 3,
                duration: 0.5,
            }),
            NodeSettings::StateMachine(StateMachineSettings {
                states: vec![
                    StateRef {
                        state_node: 2,
                        transitions: vec![TransitionRef {
                            transition_node: 5,
                            condition: 4,
                            target_state_index: 1,
                        }],
                    },
                    StateRef {
                        state_node: 3,
                        transitions: Vec::new(),
                    },
                ],
            }),
        ];
        let mut instance = build_instance(
            vec![
                constant_clip(1, &skeleton, 1.0, 1.0),
                constant_clip(2, &skeleton, 1.0, 3.0),
            ],
            nodes,
            6,
        );
        let jump = instance.get_parameter_index("Jump").unwrap();

        let mut entered_walk = 0;
        let mut left_walk = 0;
        let mut entered_jump = 0;
        let mut left_jump = 0;
        // The fade fires on frame 1 and spans frames 1..=5 (0.1s steps over a
        // 0.5s transition); both states keep updating for the whole fade, and
        // frame 6 runs the settled target alone.
        for frame in 0..7 {
            if frame == 1 {
                instance.set_bool_parameter(jump, true).unwrap();
            }
            let result = instance.evaluate(0.1, Transform::identity()).unwrap();
            entered_walk += count_state_events(result.events, enter_walk);
            left_walk += count_state_events(result.events, exit_walk);
            entered_jump += count_state_events(result.events, enter_jump);
            left_jump += count_state_events(result.events, exit_jump);

            if frame == 3 {
                let GraphNode::StateMachine(machine) = instance.nodes.get(6).unwrap() else {
                    unreachable!()
                };
                assert!(machine.is_transition_active(), "fade must span frame 3");
            }
        }

        assert_eq!(entered_walk, 1, "entry marker of the left state");
        assert_eq!(left_walk, 1, "exit marker of the left state");
        assert_eq!(entered_jump, 1, "entry marker of the entered state");
        assert_eq!(left_jump, 0, "the entered state was never left");
    }

    #[test]
    fn event_condition_reacts_to_state_entry_events() {
        let skeleton = skeleton();
        let footstep = StringId::from_name("Footstep");
        let nodes = vec![
            NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 0,
                play_in_reverse: None,
            }),
            NodeSettings::AnimationClip(AnimationClipSettings {
                data_slot: 1,
                play_in_reverse: None,
            }),
            NodeSettings::State(StateSettings {
                child: 0,
                entry_event: footstep,
                exit_event: StringId::from_name("Leave"),
            }),
            NodeSettings::State(StateSettings {
                child: 1,
                entry_event: StringId::NONE,
                exit_event: StringId::NONE,
            }),
            NodeSettings::EventCondition(EventConditionSettings { event: footstep }),
            NodeSettings::Transition(TransitionSettings {
                target_state: 3,
                duration: 0.1,
            }),
            NodeSettings::StateMachine(StateMachineSettings {
                states: vec![
                    StateRef {
                        state_node: 2,
                        transitions: vec![TransitionRef {
                            transition_node: 5,
                            condition: 4,
                            target_state_index: 1,
                        }],
                    },
                    StateRef {
                        state_node: 3,
                        transitions: Vec::new(),
                    },
                ],
            }),
        ];
        let mut instance = build_instance(
            vec![
                constant_clip(1, &skeleton, 1.0, 1.0),
                constant_clip(2, &skeleton, 1.0, 3.0),
            ],
            nodes,
            6,
        );

        // The entry state samples its entry marker on its first frame; the
        // condition sees it in the same update and fires the transition.
        let result = instance.evaluate(0.05, Transform::identity()).unwrap();
        assert!(result
            .events
            .iter()
            .any(|e| e.is_state_event() && e.id == footstep));
        {
            let GraphNode::StateMachine(machine) = instance.nodes.get(6).unwrap() else {
                unreachable!()
            };
            assert!(machine.is_transition_active());
        }

        // The marker is a one-shot: the next frame keeps updating the entry
        // state as the fade's source, but samples it no more.
        let result = instance.evaluate(0.05, Transform::identity()).unwrap();
        assert_eq!(count_state_events(result.events, footstep), 0);
    }

    #[test]
    fn event_condition_stays_false_without_a_matching_event() {
        let skeleton = skeleton();
        let mut nodes = state_machine_nodes(0.1);
        // Rewire the trigger to look for an event nothing emits.
        nodes[4] = NodeSettings::EventCondition(EventConditionSettings {
            event: StringId::from_name("NeverSampled"),
        });
        let mut instance = build_instance(
            vec![
                constant_clip(1, &skeleton, 1.0, 1.0),
                constant_clip(2, &skeleton, 1.0, 3.0),
            ],
            nodes,
            6,
        );

        instance.evaluate(0.05, Transform::identity()).unwrap();
        let GraphNode::StateMachine(machine) = instance.nodes.get(6).unwrap() else {
            unreachable!()
        };
        assert!(!machine.is_transition_active());
    }

    #[test]
    fn root_motion_override_replaces_the_flagged_axis() {
        let skeleton = skeleton();
        let mut clip = constant_clip(1, &skeleton, 1.0, 0.0);
        // The authored root moves 10 units per second along X.
        clip.set_root_motion(BoneTrack::new(
            0,
            vec![translation_key(0.0, 0.0), translation_key(1.0, 10.0)],
        ));

        let mut instance = build_instance(
            vec![clip],
            vec![
                NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 0,
                    play_in_reverse: None,
                }),
                NodeSettings::VectorParameter(VectorParameterSettings {
                    name: StringId::from_name("DesiredVelocity"),
                    default_value: [0.5, 0.0, 0.0],
                }),
                NodeSettings::RootMotionOverride(RootMotionOverrideSettings {
                    child: 0,
                    heading_velocity: Some(1),
                    facing_direction: None,
                    velocity_limit: None,
                    flags: RootMotionOverrideFlags::HEADING_X,
                    max_linear_velocity: 100.0,
                }),
            ],
            2,
        );

        let result = instance.evaluate(0.1, Transform::identity()).unwrap();
        let translation = result.root_motion_delta.translation;
        assert!((translation.x - 0.05).abs() < 1e-5);
        assert!(translation.y.abs() < 1e-6);
        assert!(translation.z.abs() < 1e-6);
    }

    #[test]
    fn speed_scale_stretches_the_reported_timeline() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![linear_clip(1, &skeleton, 2.0)],
            vec![
                NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 0,
                    play_in_reverse: None,
                }),
                NodeSettings::FloatParameter(FloatParameterSettings {
                    name: StringId::from_name("Speed"),
                    default_value: 2.0,
                }),
                NodeSettings::SpeedScale(SpeedScaleSettings {
                    child: 0,
                    scale: Some(1),
                    blend_time: 0.0,
                }),
            ],
            2,
        );

        instance.evaluate(0.25, Transform::identity()).unwrap();
        // The child saw dt * 2 and the parent reports half the duration.
        assert!((clip_node_state(&instance, 0).current_time - 0.25).abs() < 1e-5);
        let speed_state = match instance.nodes.get(2).unwrap() {
            GraphNode::SpeedScale(n) => n.state().clone(),
            _ => unreachable!(),
        };
        assert!((speed_state.duration - 1.0).abs() < 1e-5);
    }

    #[test]
    fn reversed_playback_walks_backwards() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![linear_clip(1, &skeleton, 1.0)],
            vec![
                NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 0,
                    play_in_reverse: Some(1),
                }),
                NodeSettings::BoolParameter(BoolParameterSettings {
                    name: StringId::from_name("Reverse"),
                    default_value: true,
                }),
            ],
            0,
        );

        instance.evaluate(0.25, Transform::identity()).unwrap();
        let state = clip_node_state(&instance, 0);
        assert!((state.current_time - 0.75).abs() < 1e-5);
    }

    #[test]
    fn unknown_parameters_and_type_mismatches_are_reported() {
        let skeleton = skeleton();
        let mut instance = build_instance(
            vec![constant_clip(1, &skeleton, 1.0, 0.0)],
            vec![
                NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 0,
                    play_in_reverse: None,
                }),
                NodeSettings::BoolParameter(BoolParameterSettings {
                    name: StringId::from_name("Jump"),
                    default_value: false,
                }),
            ],
            0,
        );

        assert!(instance.get_parameter_index("Missing").is_none());
        let jump = instance.get_parameter_index("Jump").unwrap();
        assert!(instance.set_bool_parameter(jump, true).is_ok());
        assert!(matches!(
            instance.set_float_parameter(jump, 1.0),
            Err(GraphError::ValueTypeMismatch { .. })
        ));
        // Writing to a non-parameter node is refused as well.
        assert!(matches!(
            instance.set_bool_parameter(0, true),
            Err(GraphError::NodeTypeMismatch { .. })
        ));
    }

    #[test]
    fn self_referential_graphs_fail_with_a_cycle_error() {
        let dataset = Arc::new(AnimationGraphDataset::new(1, Vec::new()));
        let definition = Arc::new(
            GraphDefinition::new(
                vec![NodeSettings::Passthrough(PassthroughSettings { child: 0 })],
                DatasetDescriptor {
                    asset_id: 1,
                    clip_ids: Vec::new(),
                },
                0,
            )
            .unwrap(),
        );
        let mut instance = GraphInstance::new(definition, dataset).unwrap();
        assert!(matches!(
            instance.initialize(skeleton(), SyncTrackTime::default()),
            Err(GraphError::CyclicGraph { node: 0 })
        ));
    }

    #[test]
    fn evaluating_before_initialization_is_an_error() {
        let skeleton = skeleton();
        let clips = vec![Arc::new(constant_clip(1, &skeleton, 1.0, 0.0))];
        let dataset = Arc::new(AnimationGraphDataset::new(1000, clips));
        let definition = Arc::new(
            GraphDefinition::new(
                vec![NodeSettings::AnimationClip(AnimationClipSettings {
                    data_slot: 0,
                    play_in_reverse: None,
                })],
                dataset.descriptor(),
                0,
            )
            .unwrap(),
        );
        let mut instance = GraphInstance::new(definition, dataset).unwrap();
        assert!(matches!(
            instance.evaluate(0.1, Transform::identity()),
            Err(GraphError::NotInitialized)
        ));
    }
}
