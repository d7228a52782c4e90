// src/physics/rapier.rs

use std::collections::HashMap;

use rapier3d::prelude::*;
use rapier3d::prelude::{Group, InteractionGroups};

use crate::config::PhysicsConfig;
use crate::physics::suspension::{build_wheels, probe_wheel, wheel_impulses, TireContext, Wheel};
use crate::physics::{Anchor, CollisionTag, PhysicsBackend, VehicleControl, VehicleState};
use crate::track::{BarrierGroup, TrackDefinition};

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);
const GROUP_BARRIER: Group = Group::from_bits_truncate(0b0100);
const GROUP_TRIGGER: Group = Group::from_bits_truncate(0b1000);

/// Share of lateral tire force applied at the contact height.
const ROLL_FACTOR: f32 = 0.3;

/// An upward frame force asks for support, not lift. The wheels already push
/// `wheel_support` newtons up this sub-step, so only the shortfall is added.
/// With no wheel on the ground there is nothing to hold the car onto.
fn support_shortfall(requested: Vector<Real>, wheel_support: Real, wheels_down: bool) -> Vector<Real> {
    let mut force = requested;
    if requested.y > 0.0 {
        force.y = if wheels_down {
            (requested.y - wheel_support.max(0.0)).max(0.0)
        } else {
            0.0
        };
    }
    force
}

pub struct RapierPhysics {
    pub config: PhysicsConfig,
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,

    chassis: RigidBodyHandle,
    chassis_collider: ColliderHandle,
    wheels: Vec<Wheel>,
    tags: HashMap<ColliderHandle, CollisionTag>,
    barriers: HashMap<BarrierGroup, Vec<ColliderHandle>>,
    coins: HashMap<u32, ColliderHandle>,
    removed_coins: Vec<u32>,

    control: VehicleControl,
    frame_force: Vector<Real>,
    frame_torque: Vector<Real>,
    accumulator: f32,
    wheel_contacts: [bool; 4],
    chassis_probe_length: f32,
}

impl RapierPhysics {
    /// Build the world for `track` with the chassis resting at `spawn`.
    pub fn new(config: PhysicsConfig, track: &TrackDefinition, spawn: &Anchor, chassis_probe_length: f32) -> Self {
        let gravity = vector![0.0, -config.gravity, 0.0];
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let mut tags = HashMap::new();

        // === Ground slab, top surface at y = 0 ===
        let ground_rb = RigidBodyBuilder::fixed().translation(vector![0.0, -1.0, 0.0]).build();
        let ground_handle = bodies.insert(ground_rb);
        let ground = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        let h = colliders.insert_with_parent(ground, ground_handle, &mut bodies);
        tags.insert(h, CollisionTag::Ground);

        // === Alternate-route walls ===
        let mut barriers: HashMap<BarrierGroup, Vec<ColliderHandle>> = HashMap::new();
        for b in &track.barriers {
            let [hx, hy, hz] = b.half_extents;
            let [cx, cy, cz] = b.center;
            let wall = ColliderBuilder::cuboid(hx, hy, hz)
                .translation(vector![cx, cy, cz])
                .collision_groups(InteractionGroups::new(GROUP_BARRIER, GROUP_CHASSIS))
                .friction(0.3)
                .build();
            let h = colliders.insert(wall);
            tags.insert(h, CollisionTag::Barrier(b.group));
            barriers.entry(b.group).or_default().push(h);
        }

        // === Checkpoint and coin triggers ===
        for cp in &track.checkpoints {
            let [hx, hy, hz] = cp.half_extents;
            let [cx, cy, cz] = cp.center;
            let trigger = ColliderBuilder::cuboid(hx, hy, hz)
                .translation(vector![cx, cy, cz])
                .sensor(true)
                .collision_groups(InteractionGroups::new(GROUP_TRIGGER, GROUP_CHASSIS))
                .build();
            let h = colliders.insert(trigger);
            tags.insert(h, CollisionTag::Checkpoint(cp.id.clone()));
        }

        let mut coins = HashMap::new();
        for coin in &track.coins {
            let [cx, cy, cz] = coin.center;
            let trigger = ColliderBuilder::ball(coin.radius)
                .translation(vector![cx, cy, cz])
                .sensor(true)
                .collision_groups(InteractionGroups::new(GROUP_TRIGGER, GROUP_CHASSIS))
                .build();
            let h = colliders.insert(trigger);
            tags.insert(h, CollisionTag::Coin(coin.id));
            coins.insert(coin.id, h);
        }

        // === Chassis ===
        let [hx, hy, hz] = config.chassis_half_extents;
        let [ox, oy, oz] = config.chassis_com_offset;
        let volume = 8.0 * hx * hy * hz;
        let density = config.chassis_mass / volume; // ρ = m / V

        let rb = RigidBodyBuilder::dynamic()
            .position(Isometry::from_parts(spawn.position.coords.into(), spawn.orientation))
            .linear_damping(config.linear_damping)
            .angular_damping(config.angular_damping)
            .ccd_enabled(true)
            .build();
        let chassis = bodies.insert(rb);

        let body_collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![ox, oy, oz])
            .collision_groups(InteractionGroups::new(
                GROUP_CHASSIS,
                GROUP_GROUND | GROUP_BARRIER | GROUP_TRIGGER,
            ))
            .density(density)
            .friction(0.0) // tires carry all traction
            .restitution(0.0)
            .build();
        let chassis_collider = colliders.insert_with_parent(body_collider, chassis, &mut bodies);

        let wheels = build_wheels(&config);

        tracing::info!(
            bodies = bodies.len(),
            colliders = colliders.len(),
            triggers = track.checkpoints.len() + track.coins.len(),
            "physics world built"
        );

        Self {
            config,
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            chassis,
            chassis_collider,
            wheels,
            tags,
            barriers,
            coins,
            removed_coins: Vec::new(),
            control: VehicleControl::idle(),
            frame_force: Vector::zeros(),
            frame_torque: Vector::zeros(),
            accumulator: 0.0,
            wheel_contacts: [false; 4],
            chassis_probe_length,
        }
    }

    fn ray_filter(&self) -> QueryFilter<'static> {
        QueryFilter::default()
            .exclude_rigid_body(self.chassis)
            .groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND | GROUP_BARRIER))
    }

    /// Wheel raycasts, tire impulses and the frame's external force/torque.
    fn apply_wheel_forces(&mut self, dt: Real) {
        self.query_pipeline.update(&self.colliders);

        let Some(body) = self.bodies.get(self.chassis) else { return };
        let filter = self.ray_filter();
        let ctx = TireContext {
            dt,
            mass: body.mass(),
            grip: self.config.lateral_grip,
            com: *body.center_of_mass(),
            roll_factor: ROLL_FACTOR,
        };

        // collect impulses here, apply later
        let mut impulses = Vec::new();
        let mut support = 0.0;
        for wheel in &self.wheels {
            let contact = probe_wheel(
                wheel,
                body,
                self.control.steering_angle,
                &self.config,
                &self.query_pipeline,
                &self.bodies,
                &self.colliders,
                filter,
            );
            self.wheel_contacts[wheel.id.index()] = contact.is_some();
            if let Some(c) = contact {
                support += c.normal_force.max(0.0) * c.ground_normal.y;
                impulses.extend(wheel_impulses(&c, &self.control, &ctx));
            }
        }
        let frame_force = support_shortfall(self.frame_force, support, self.wheel_contacts.contains(&true));

        let Some(body) = self.bodies.get_mut(self.chassis) else { return };
        for (impulse, point) in impulses {
            match point {
                Some(p) => body.apply_impulse_at_point(impulse, p, true),
                None => body.apply_impulse(impulse, true),
            }
        }
        if frame_force.magnitude() > 0.0 {
            body.apply_impulse(frame_force * dt, true);
        }
        if self.frame_torque.magnitude() > 0.0 {
            body.apply_torque_impulse(self.frame_torque * dt, true);
        }
    }

    fn substep(&mut self, dt: Real) {
        self.apply_wheel_forces(dt);

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    fn chassis_probe_hit(&self, body: &RigidBody) -> bool {
        let ray = Ray::new(*body.center_of_mass(), vector![0.0, -1.0, 0.0]);
        self.query_pipeline
            .cast_ray(
                &self.bodies,
                &self.colliders,
                &ray,
                self.chassis_probe_length,
                true,
                self.ray_filter(),
            )
            .is_some()
    }

    fn other_collider(&self, a: ColliderHandle, b: ColliderHandle) -> ColliderHandle {
        if a == self.chassis_collider { b } else { a }
    }
}

impl PhysicsBackend for RapierPhysics {
    /// Fixed sub-steps from an accumulator, at most `max_substeps` per call.
    /// Time beyond that budget is dropped rather than carried over.
    fn step(&mut self, dt: f32) {
        let fixed = self.config.fixed_dt;
        self.accumulator += dt.max(0.0);

        let mut steps = 0;
        while self.accumulator >= fixed && steps < self.config.max_substeps {
            self.substep(fixed);
            self.accumulator -= fixed;
            steps += 1;
        }
        if steps == self.config.max_substeps {
            self.accumulator = self.accumulator.min(fixed);
        }

        self.frame_force = Vector::zeros();
        self.frame_torque = Vector::zeros();
        tracing::trace!(steps, "physics step");
    }

    fn vehicle_state(&self) -> VehicleState {
        let Some(body) = self.bodies.get(self.chassis) else {
            return VehicleState {
                position: Point::new(f32::NAN, f32::NAN, f32::NAN),
                ..VehicleState::at_rest(&Anchor::from_spawn([0.0; 3], 0.0), 0.0, self.config.gravity)
            };
        };
        let iso = body.position();

        VehicleState {
            position: Point::from(iso.translation.vector),
            orientation: iso.rotation,
            linear_velocity: *body.linvel(),
            angular_velocity: *body.angvel(),
            wheel_contacts: self.wheel_contacts,
            chassis_grounded: self.chassis_probe_hit(body),
            mass: body.mass(),
            gravity: self.config.gravity,
        }
    }

    fn apply_control(&mut self, control: &VehicleControl) {
        self.control = *control;
    }

    fn query_contacts(&self) -> Vec<CollisionTag> {
        let mut out = Vec::new();

        for (a, b, intersecting) in self.narrow_phase.intersection_pairs_with(self.chassis_collider) {
            if !intersecting {
                continue;
            }
            let other = self.other_collider(a, b);
            if let Some(tag) = self.tags.get(&other) {
                out.push(tag.clone());
            }
        }

        for pair in self.narrow_phase.contact_pairs_with(self.chassis_collider) {
            if !pair.has_any_active_contact {
                continue;
            }
            let other = self.other_collider(pair.collider1, pair.collider2);
            if let Some(tag) = self.tags.get(&other) {
                out.push(tag.clone());
            }
        }

        out
    }

    fn teleport(&mut self, anchor: &Anchor) {
        if let Some(body) = self.bodies.get_mut(self.chassis) {
            body.set_position(Isometry::from_parts(anchor.position.coords.into(), anchor.orientation), true);
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
            body.reset_forces(true);
            body.reset_torques(true);
        }
        self.control = VehicleControl::idle();
        self.frame_force = Vector::zeros();
        self.frame_torque = Vector::zeros();
        self.accumulator = 0.0;
        tracing::debug!(position = ?anchor.position, "chassis teleported");
    }

    fn set_velocities(&mut self, linear: Vector<Real>, angular: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(self.chassis) {
            body.set_linvel(linear, true);
            body.set_angvel(angular, true);
        }
    }

    fn apply_frame_force(&mut self, force: Vector<Real>) {
        self.frame_force += force;
    }

    fn apply_frame_torque(&mut self, torque: Vector<Real>) {
        self.frame_torque += torque;
    }

    fn set_barrier_enabled(&mut self, group: BarrierGroup, enabled: bool) {
        let Some(handles) = self.barriers.get(&group) else { return };
        for h in handles {
            if let Some(c) = self.colliders.get_mut(*h) {
                c.set_enabled(enabled);
            }
        }
        tracing::debug!(?group, enabled, "barrier toggled");
    }

    fn remove_coin(&mut self, id: u32) {
        let Some(h) = self.coins.get(&id).copied() else { return };
        if let Some(c) = self.colliders.get_mut(h) {
            c.set_enabled(false);
        }
        self.tags.remove(&h);
        self.removed_coins.push(id);
    }

    fn restore_coins(&mut self) {
        for id in self.removed_coins.drain(..) {
            let Some(h) = self.coins.get(&id).copied() else { continue };
            if let Some(c) = self.colliders.get_mut(h) {
                c.set_enabled(true);
            }
            self.tags.insert(h, CollisionTag::Coin(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEIGHT: Real = 1200.0 * 9.81;

    #[test]
    fn loaded_springs_leave_nothing_to_add() {
        let f = support_shortfall(vector![0.0, WEIGHT, 0.0], WEIGHT * 1.02, true);
        assert_eq!(f, Vector::zeros());
    }

    #[test]
    fn soft_springs_get_topped_up_to_the_weight() {
        let f = support_shortfall(vector![0.0, WEIGHT, 0.0], WEIGHT * 0.75, true);
        assert!((f.y - WEIGHT * 0.25).abs() < 1e-2);
    }

    #[test]
    fn hanging_wheels_get_no_support() {
        let f = support_shortfall(vector![10.0, WEIGHT, 0.0], 0.0, false);
        assert_eq!(f, vector![10.0, 0.0, 0.0]);
    }

    #[test]
    fn downward_and_sideways_forces_pass_through() {
        let f = support_shortfall(vector![3.0, -50.0, 1.0], WEIGHT, true);
        assert_eq!(f, vector![3.0, -50.0, 1.0]);
    }
}
