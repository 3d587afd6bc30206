//! Initial migration: hub members and their source links.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_hub_members(manager).await?;
        self.create_source_links(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SourceLinks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(HubMembers::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_hub_members(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HubMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HubMembers::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HubMembers::AccessToken).text().not_null())
                    .col(ColumnDef::new(HubMembers::RefreshToken).text().not_null())
                    .col(
                        ColumnDef::new(HubMembers::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(HubMembers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_source_links(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SourceLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SourceLinks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SourceLinks::MemberId).string().not_null())
                    .col(ColumnDef::new(SourceLinks::Source).string().not_null())
                    .col(ColumnDef::new(SourceLinks::AccessToken).text().not_null())
                    .col(ColumnDef::new(SourceLinks::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(SourceLinks::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SourceLinks::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SourceLinks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_source_links_member")
                            .from(SourceLinks::Table, SourceLinks::MemberId)
                            .to(HubMembers::Table, HubMembers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_source_links_member_source")
                    .table(SourceLinks::Table)
                    .col(SourceLinks::MemberId)
                    .col(SourceLinks::Source)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_source_links_last_synced")
                    .table(SourceLinks::Table)
                    .col(SourceLinks::LastSyncedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "hub_members")]
enum HubMembers {
    Table,
    Id,
    AccessToken,
    RefreshToken,
    TokenExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "source_links")]
enum SourceLinks {
    Table,
    Id,
    MemberId,
    Source,
    AccessToken,
    RefreshToken,
    TokenExpiresAt,
    LastSyncedAt,
    CreatedAt,
}
