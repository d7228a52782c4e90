// ==============================================================================
// suspension.rs — RAYCAST WHEELS: SUSPENSION, CONTACT BASIS, TIRE IMPULSES
// ------------------------------------------------------------------------------
// Each wheel casts a ray straight down from its chassis mount point. A hit
// within rest length + radius means the wheel is on the ground; the spring and
// damper turn compression into a normal force.
//
// probe_wheel(...)
//     Raycast, compression, normal force, steered wheel basis and the slip
//     velocities (v_long, v_lat) at the contact point.
// wheel_impulses(...)
//     Normal impulse at the contact, longitudinal impulse (engine + stuck
//     bonus + brake) at the COM, lateral impulse raised toward COM height so
//     it yaws the chassis without rolling it over.
//
// Nothing here mutates the world; rapier.rs applies the returned impulses.
// ==============================================================================

use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;

use crate::config::PhysicsConfig;
use crate::physics::{VehicleControl, WheelId};

#[derive(Clone, Debug)]
pub struct Wheel {
    pub id: WheelId,
    pub offset: Point<Real>,     // mount point, chassis local space
    pub rest_length: Real,       // suspension neutral length
    pub max_length: Real,        // max compression
    pub radius: Real,
    pub stiffness: Real,         // N/m
    pub damping: Real,           // N*s/m
}

/// Spring rate and damper for a given static sag: k = m*g/sag,
/// c = 2*zeta*sqrt(k*m), with m the mass carried by one wheel.
pub fn suspension_from_sag(vehicle_mass: f32, wheels: usize, gravity: f32, sag_m: f32, zeta: f32) -> (f32, f32) {
    let m = vehicle_mass / wheels as f32;
    let k = m * gravity / sag_m.max(1e-3);
    let c = 2.0 * zeta * (k * m).sqrt();
    (k, c)
}

pub fn build_wheels(cfg: &PhysicsConfig) -> Vec<Wheel> {
    let (k, c) = suspension_from_sag(
        cfg.chassis_mass,
        4,
        cfg.gravity,
        cfg.suspension_sag,
        cfg.suspension_zeta,
    );
    let half_track = cfg.track_width * 0.5;
    let half_base = cfg.wheelbase * 0.5;
    let y = -cfg.chassis_half_extents[1];

    WheelId::ALL
        .iter()
        .map(|&id| {
            let x = match id {
                WheelId::FL | WheelId::RL => -half_track,
                WheelId::FR | WheelId::RR => half_track,
            };
            // forward is -Z
            let z = if id.is_front() { -half_base } else { half_base };
            Wheel {
                id,
                offset: point![x, y, z],
                rest_length: cfg.suspension_rest,
                max_length: cfg.suspension_travel,
                radius: cfg.wheel_radius,
                stiffness: k,
                damping: c,
            }
        })
        .collect()
}

pub(crate) fn compute_suspension_force(compression: f32, suspension_vel: f32, k: f32, c: f32) -> f32 {
    // Deadzone
    let v = if suspension_vel.abs() < 0.05 { 0.0 } else { suspension_vel };

    // One-way damper (kills rebound)
    let v = if v > 0.0 { v * 0.4 } else { v };

    let spring = k * compression;
    let damper = (-c * v).clamp(-spring * 0.6, spring * 0.6);

    (spring + damper).max(0.0)
}

/// Inner/outer front wheel angles for a centerline steering angle.
/// Returns (left, right).
pub fn ackermann_angles(base: f32, wheelbase: f32, track: f32) -> (f32, f32) {
    if base.abs() < 1e-4 {
        return (0.0, 0.0);
    }

    let sign = base.signum();
    let r = wheelbase / base.abs().tan();

    let r_in = (r - track * 0.5).max(0.01);
    let r_out = (r + track * 0.5).max(0.01);

    let inner = (wheelbase / r_in).atan() * sign;
    let outer = (wheelbase / r_out).atan() * sign;

    // positive base turns left, so the left wheel is inside
    if sign > 0.0 { (inner, outer) } else { (outer, inner) }
}

/// Steering angle of one wheel after the Ackermann blend.
pub fn wheel_steer_angle(id: WheelId, base: f32, cfg: &PhysicsConfig) -> f32 {
    if !id.is_front() {
        return 0.0;
    }
    let (ack_l, ack_r) = ackermann_angles(base, cfg.wheelbase, cfg.track_width);
    let ack = if id == WheelId::FL { ack_l } else { ack_r };
    (1.0 - cfg.ackermann) * base + cfg.ackermann * ack
}

#[inline]
pub fn point_velocity(linvel: Vector<Real>, angvel: Vector<Real>, com: Point<Real>, p: Point<Real>) -> Vector<Real> {
    let r = p.coords - com.coords;
    linvel + angvel.cross(&r)
}

/// World-space (forward, side) of a wheel, projected onto the ground plane.
pub fn wheel_basis_world(
    rot: &UnitQuaternion<Real>,
    steer_angle: f32,
    ground_n: &Vector<Real>,
) -> (Vector<Real>, Vector<Real>) {
    let steer_rot = UnitQuaternion::from_axis_angle(&Vector::y_axis(), steer_angle);
    let raw = rot * (steer_rot * vector![0.0, 0.0, -1.0]);

    let planar = raw - ground_n * raw.dot(ground_n);
    let forward = if planar.magnitude() > 1e-6 {
        planar.normalize()
    } else {
        vector![0.0, 0.0, -1.0]
    };
    // right-handed: forward x up = right
    let side = forward.cross(ground_n).normalize();
    (forward, side)
}

#[derive(Clone, Debug)]
pub struct WheelContact {
    pub wheel: WheelId,
    pub hit_point: Point<Real>,
    pub ground_normal: Vector<Real>,
    pub compression: f32,
    pub compression_ratio: f32,
    pub normal_force: f32,
    pub forward: Vector<Real>,
    pub side: Vector<Real>,
    pub v_long: f32,
    pub v_lat: f32,
}

/// Raycast one wheel. `None` when the wheel hangs free.
pub fn probe_wheel(
    wheel: &Wheel,
    body: &RigidBody,
    steering_angle: f32,
    cfg: &PhysicsConfig,
    query: &QueryPipeline,
    bodies: &RigidBodySet,
    colliders: &ColliderSet,
    filter: QueryFilter,
) -> Option<WheelContact> {
    let pos = body.position();
    let linvel = *body.linvel();
    let angvel = *body.angvel();
    let com = *body.center_of_mass();

    let ground_n: Vector<Real> = vector![0.0, 1.0, 0.0];
    let dir = -ground_n;
    let origin = pos * wheel.offset;
    let max_dist = wheel.rest_length + wheel.radius;

    let ray = Ray::new(origin, dir);
    let (_hit, toi) = query.cast_ray(bodies, colliders, &ray, max_dist, true, filter)?;

    let hit_point = origin + dir * toi;
    let suspension_length = toi - wheel.radius;
    let compression = (wheel.rest_length - suspension_length).clamp(0.0, wheel.max_length);
    let compression_ratio = (compression / wheel.max_length).clamp(0.0, 1.0);

    let point_vel = point_velocity(linvel, angvel, com, hit_point);
    let suspension_vel = point_vel.dot(&ground_n);
    let normal_force = compute_suspension_force(compression, suspension_vel, wheel.stiffness, wheel.damping)
        .min(25_000.0);

    let angle = wheel_steer_angle(wheel.id, steering_angle, cfg);
    let (forward, side) = wheel_basis_world(&pos.rotation, angle, &ground_n);

    Some(WheelContact {
        wheel: wheel.id,
        hit_point,
        ground_normal: ground_n,
        compression,
        compression_ratio,
        normal_force,
        forward,
        side,
        v_long: point_vel.dot(&forward),
        v_lat: point_vel.dot(&side),
    })
}

/// Chassis values the tire model needs every sub-step.
#[derive(Debug, Clone, Copy)]
pub struct TireContext {
    pub dt: f32,
    pub mass: f32,
    pub grip: f32,
    pub com: Point<Real>,
    pub roll_factor: f32, // 0 = lateral at COM height, 1 = at the contact
}

/// (impulse, application point). `None` means the center of mass.
pub type WheelImpulse = (Vector<Real>, Option<Point<Real>>);

pub fn wheel_impulses(contact: &WheelContact, control: &VehicleControl, ctx: &TireContext) -> Vec<WheelImpulse> {
    let mut out = Vec::with_capacity(3);
    let dt = ctx.dt;
    let wheel_mass = (ctx.mass * 0.25).max(1.0);

    if contact.normal_force > 0.0 {
        out.push((contact.ground_normal * (contact.normal_force * dt), Some(contact.hit_point)));
    }

    if contact.normal_force < 50.0 {
        return out; // barely touching: no traction
    }
    let traction = ctx.grip * contact.normal_force;

    // ----------------------------------------------------
    // Longitudinal: engine on the rear pair, stuck bonus on all four
    // ----------------------------------------------------
    let mut drive = control.stuck_bonus * control.engine_force.signum();
    if contact.wheel.is_rear() {
        drive += control.engine_force * 0.5;
    }
    let drive = drive.clamp(-traction, traction);

    // Brake opposes v_long, never pushes
    let mut brake = 0.0;
    if control.brake_force > 0.0 && contact.v_long.abs() >= 0.05 {
        let max_brake = (control.brake_force * 0.25).min(traction) * dt;
        brake = (-contact.v_long * wheel_mass).clamp(-max_brake, max_brake);
    }

    let long = contact.forward * (drive * dt + brake);
    if long.magnitude() > 1e-6 {
        out.push((long, None));
    }

    // ----------------------------------------------------
    // Lateral: cancel side slip within the Coulomb limit
    // ----------------------------------------------------
    let max_lat = traction * dt;
    let mut lat = (-contact.v_lat * wheel_mass).clamp(-max_lat, max_lat);
    if contact.wheel.is_rear() {
        lat *= 0.85;
    }

    if lat.abs() > 1e-6 {
        let h = contact.hit_point.y + (ctx.com.y - contact.hit_point.y) * (1.0 - ctx.roll_factor);
        let at = point![contact.hit_point.x, h, contact.hit_point.z];
        out.push((contact.side * lat, Some(at)));
    }

    out
}
