pub mod constant_product;
pub mod fixed_point;
pub mod full_math;
pub mod log_exp;
pub mod percentage;
pub mod sqrt_price_math;
pub mod stable;
pub mod swap_math;
pub mod tick_math;
pub mod wad_ray;
pub mod weighted;
